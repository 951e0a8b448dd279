//! Shared fixtures for driving the client against a mock owner API.
//!
//! One [`mockito`] server plays the SSO service, the owner API and the spot
//! price service at once; every test gets its own server and its own cache
//! file in a temporary directory.
#![allow(dead_code)]

use chrono::Utc;
use mockito::{Matcher, Mock, Server};
use serde_json::{Value, json};
use std::{path::PathBuf, time::Duration};
use tempfile::TempDir;
use tesla_cron::{
    Config,
    auth::SsoToken,
    cache::{CachedSession, SessionCache},
};

pub const EMAIL: &str = "owner@example.com";
pub const VIN: &str = "5YJ3E1EA7KF000001";
pub const CLIENT_ID: &str = "ownerapi";

/// Mock services plus an isolated cache location.
pub struct TestEnv {
    pub server: mockito::ServerGuard,
    dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self {
            server: Server::new_async().await,
            dir: TempDir::new().unwrap(),
        }
    }

    /// For tests that are not running inside a tokio runtime.
    pub fn new_blocking() -> Self {
        Self {
            server: Server::new(),
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("tesla_cron.json")
    }

    /// Configuration pointing every service at the mock server.
    pub fn config(&self) -> Config {
        let url = self.server.url();
        Config {
            cache_file: self.cache_path(),
            auth_url: url.clone(),
            api_url: url.clone(),
            proxy_url: None,
            client_id: CLIENT_ID.into(),
            wake_interval: Duration::ZERO,
            wake_attempts: 2,
            price_url: format!("{url}/dataset/Elspotprices"),
            price_area: "DK2".into(),
        }
    }

    /// Environment variables giving the binary the same configuration.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let config = self.config();
        vec![
            ("TESLA_CACHE_FILE", config.cache_file.display().to_string()),
            ("TESLA_AUTH_URL", config.auth_url),
            ("TESLA_API_URL", config.api_url),
            ("TESLA_CLIENT_ID", config.client_id),
            ("TESLA_WAKE_INTERVAL_SECS", "0".into()),
            ("TESLA_WAKE_ATTEMPTS", config.wake_attempts.to_string()),
            ("SPOT_PRICE_URL", config.price_url),
            ("TESLA_CRON_LOG", "warn".into()),
        ]
    }

    /// Writes a cached session for [`EMAIL`] expiring `expires_in_secs` from now.
    pub fn seed_session(&self, access_token: &str, refresh_token: &str, expires_in_secs: i64) {
        self.seed_token(sso_token(access_token, refresh_token, expires_in_secs));
    }

    pub fn seed_token(&self, token: SsoToken) {
        let mut cache = SessionCache::load(&self.cache_path());
        cache.insert(EMAIL, CachedSession::new(format!("{}/", self.server.url()), token));
        cache.save(&self.cache_path()).unwrap();
    }

    pub fn cached_token(&self) -> Option<SsoToken> {
        SessionCache::load(&self.cache_path())
            .get(EMAIL)
            .map(|session| session.sso.clone())
    }

    /// Token endpoint accepting `refresh_token` and issuing a rotated token set.
    pub fn token_refresh(&mut self, refresh_token: &str, access: &str, rotated: &str) -> Mock {
        self.token_endpoint(
            refresh_token,
            json!({
                "access_token": access,
                "refresh_token": rotated,
                "id_token": "id",
                "token_type": "Bearer",
                "expires_in": 28800
            }),
        )
    }

    /// Token endpoint that issues only a new access token.
    pub fn token_refresh_without_rotation(&mut self, refresh_token: &str, access: &str) -> Mock {
        self.token_endpoint(
            refresh_token,
            json!({
                "access_token": access,
                "token_type": "Bearer",
                "expires_in": 3600
            }),
        )
    }

    fn token_endpoint(&mut self, refresh_token: &str, reply: Value) -> Mock {
        self.server
            .mock("POST", "/oauth2/v3/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
                Matcher::UrlEncoded("client_id".into(), CLIENT_ID.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(reply.to_string())
    }

    /// Owner API call expecting `access_token`, replying with `response` in the envelope.
    pub fn api(&mut self, method: &str, path: &str, access_token: &str, response: Value) -> Mock {
        self.server
            .mock(method, path)
            .match_header("authorization", format!("Bearer {access_token}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "response": response }).to_string())
    }

    pub fn vehicle_list(&mut self, access_token: &str, vehicles: Value) -> Mock {
        self.api("GET", "/api/1/vehicles", access_token, vehicles)
    }

    /// Command endpoint for [`VIN`] replying with `result` and `reason`.
    pub fn command(&mut self, command: &str, result: bool, reason: &str) -> Mock {
        self.api(
            "POST",
            &format!("/api/1/vehicles/{VIN}/command/{command}"),
            "access",
            command_result(result, reason),
        )
    }
}

pub fn sso_token(access_token: &str, refresh_token: &str, expires_in_secs: i64) -> SsoToken {
    SsoToken {
        access_token: access_token.into(),
        refresh_token: refresh_token.into(),
        id_token: None,
        token_type: "Bearer".into(),
        expires_in: None,
        expires_at: (Utc::now().timestamp() + expires_in_secs) as f64,
    }
}

pub fn vehicle(state: &str) -> Value {
    json!({
        "id": 12345678901234567u64,
        "vehicle_id": 1234567890,
        "vin": VIN,
        "display_name": "Roadrunner",
        "state": state,
        "in_service": false
    })
}

pub fn vehicle_data(level: i32, limit: i32, charging_state: &str) -> Value {
    json!({
        "id": 12345678901234567u64,
        "vin": VIN,
        "state": "online",
        "charge_state": {
            "battery_level": level,
            "charge_current_request": 16,
            "charge_limit_soc": limit,
            "charging_state": charging_state,
            "scheduled_charging_mode": "Off",
            "scheduled_charging_start_time": null
        },
        "drive_state": {
            "latitude": 55.6761,
            "longitude": 12.5683
        }
    })
}

pub fn command_result(result: bool, reason: &str) -> Value {
    json!({ "result": result, "reason": reason })
}
