//! Authenticated session against the owner API.
//!
//! [`Tesla`] ties one account e-mail to its cached SSO session. Opening a
//! client never touches the network; tokens are refreshed lazily the first
//! time a request needs one, and every new token set is written back to the
//! cache straight away.

use crate::{
    auth::{self, AuthError, SsoToken},
    cache::{CacheError, CachedSession, SessionCache},
    config::Config,
    vehicle::Vehicle,
};
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No session for {0}; a refresh token is required")]
    NotAuthorized(String),

    #[error("Access token was rejected by the API")]
    Unauthorized,

    #[error("API request failed: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected API reply: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    ReqwestRequest(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Which base URL a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Owner API, for reads
    Api,
    /// Signed-command proxy when configured, owner API otherwise
    Command,
}

/// All owner API replies wrap their payload in `{"response": ...}`
#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

pub struct Tesla {
    email: String,
    config: Config,
    cache: SessionCache,
    http: Client,
}

impl Tesla {
    /// Opens the session for `email` from the configured cache file.
    pub fn open(email: impl Into<String>, config: Config) -> Result<Self, ApiError> {
        let email = email.into();
        let cache = SessionCache::load(&config.cache_file);
        let http = auth::create_http_client()?;
        debug!(email = %email, cached = cache.get(&email).is_some(), "opened session");

        Ok(Self {
            email,
            config,
            cache,
            http,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True when the cache holds a session for this account.
    ///
    /// The access token may still be expired; it is refreshed on first use.
    pub fn authorized(&self) -> bool {
        self.cache.get(&self.email).is_some()
    }

    /// Exchanges a user-supplied refresh token and stores the new session.
    pub async fn refresh_token(&mut self, refresh_token: &str) -> Result<(), ApiError> {
        let token = auth::refresh(&self.config, refresh_token).await?;
        self.store(token)
    }

    /// Returns a usable access token, refreshing the cached one when expired.
    pub async fn access_token(&mut self) -> Result<String, ApiError> {
        let session = self
            .cache
            .get(&self.email)
            .ok_or_else(|| ApiError::NotAuthorized(self.email.clone()))?;

        if !session.sso.is_expired(Utc::now()) {
            return Ok(session.sso.access_token.clone());
        }

        info!(email = %self.email, "access token expired, refreshing");
        let refresh_token = session.sso.refresh_token.clone();
        let token = auth::refresh(&self.config, &refresh_token).await?;
        let access_token = token.access_token.clone();
        self.store(token)?;
        Ok(access_token)
    }

    /// Forgets the cached session for this account.
    pub fn logout(&mut self) -> Result<bool, ApiError> {
        let removed = self.cache.remove(&self.email).is_some();
        if removed {
            self.cache.save(&self.config.cache_file)?;
        }
        Ok(removed)
    }

    pub async fn vehicle_list(&mut self) -> Result<Vec<Vehicle>, ApiError> {
        self.get(Endpoint::Api, "/api/1/vehicles").await
    }

    /// Sends an authenticated GET and unwraps the `response` envelope.
    pub async fn get<T: DeserializeOwned>(
        &mut self,
        endpoint: Endpoint,
        path: &str,
    ) -> Result<T, ApiError> {
        let body = self.request(Method::GET, endpoint, path, None::<&()>).await?;
        unwrap_envelope(&body)
    }

    /// Sends an authenticated POST with a JSON body and unwraps the reply.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &mut self,
        endpoint: Endpoint,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = self.request(Method::POST, endpoint, path, Some(body)).await?;
        unwrap_envelope(&body)
    }

    async fn request<B: Serialize>(
        &mut self,
        method: Method,
        endpoint: Endpoint,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        let access_token = self.access_token().await?;
        let url = format!("{}{}", self.base_url(endpoint), path);
        debug!(%method, %url, "owner API request");

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(access_token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.text().await?)
    }

    fn base_url(&self, endpoint: Endpoint) -> &str {
        match (endpoint, &self.config.proxy_url) {
            (Endpoint::Command, Some(proxy)) => proxy,
            _ => &self.config.api_url,
        }
    }

    fn store(&mut self, mut token: SsoToken) -> Result<(), ApiError> {
        let url = format!("{}/", self.config.auth_url);
        match self.cache.get(&self.email) {
            Some(existing) => {
                let mut session = existing.clone();
                // refresh replies don't carry an id token
                token.id_token = token.id_token.or(session.sso.id_token.take());
                session.url = url;
                session.sso = token;
                self.cache.insert(self.email.clone(), session);
            }
            None => self
                .cache
                .insert(self.email.clone(), CachedSession::new(url, token)),
        }
        self.cache.save(&self.config.cache_file)?;
        Ok(())
    }
}

/// Decodes the payload out of a `{"response": ...}` reply.
pub(crate) fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.response)
        .map_err(|source| ApiError::Decode {
            source,
            body: body.to_string(),
        })
}
