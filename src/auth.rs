use crate::config::Config;
use chrono::{DateTime, Utc};
use jwt::Token;
use oauth2::{
    AuthType, ClientId, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
    basic::BasicClient,
};
use reqwest::{Client, redirect::Policy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Token endpoint, relative to the SSO base URL
const TOKEN_PATH: &str = "/oauth2/v3/token";

/// Scopes requested on every refresh. `offline_access` makes the server
/// hand out a new refresh token alongside the access token.
const SCOPES: [&str; 3] = ["openid", "email", "offline_access"];

/// Lifetime assumed when neither the response nor the token states one
const DEFAULT_LIFETIME_SECS: f64 = 8.0 * 3600.0;

/// An access token is treated as expired this long before it actually is
const EXPIRY_MARGIN_SECS: f64 = 60.0;

/// Token set issued by the SSO service.
///
/// Field names follow the OAuth2 token response, with `expires_at` added as
/// a unix timestamp so a cached token can be checked without the response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SsoToken {
    pub access_token: String,
    pub refresh_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    pub expires_at: f64,
}

fn default_token_type() -> String {
    "Bearer".into()
}

impl SsoToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() as f64 >= self.expires_at - EXPIRY_MARGIN_SECS
    }
}

/// Exchanges an SSO refresh token for a fresh token set.
///
/// The server usually rotates the refresh token; when it doesn't, the one
/// passed in stays valid and is kept.
pub async fn refresh(config: &Config, refresh_token: &str) -> Result<SsoToken, AuthError> {
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(AuthError::EmptyRefreshToken);
    }

    let http_client = create_http_client()?;
    let token_url = format!("{}{}", config.auth_url, TOKEN_PATH);

    let client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_token_uri(TokenUrl::new(token_url)?);

    debug!(client_id = %config.client_id, "refreshing SSO token");

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .request_async(&http_client)
        .await
        .map_err(|e| match e {
            RequestTokenError::ServerResponse(response) => {
                AuthError::Rejected(response.to_string())
            }
            e => AuthError::TokenExchange(e.into()),
        })?;

    let access_token = response.access_token().secret().to_string();
    let now = Utc::now();
    let expires_in = response.expires_in().map(|d| d.as_secs());
    let expires_at = match expires_in {
        Some(secs) => now.timestamp() as f64 + secs as f64,
        None => jwt_expiry(&access_token)
            .unwrap_or_else(|| now.timestamp() as f64 + DEFAULT_LIFETIME_SECS),
    };

    let refresh_token = response
        .refresh_token()
        .map(|t| t.secret().to_string())
        .unwrap_or_else(|| refresh_token.to_string());

    info!(expires_at, "SSO token refreshed");

    Ok(SsoToken {
        access_token,
        refresh_token,
        id_token: None,
        token_type: default_token_type(),
        expires_in,
        expires_at,
    })
}

/// Creates an HTTP client configured for OAuth operations.
pub(crate) fn create_http_client() -> Result<Client, AuthError> {
    Ok(Client::builder()
        .redirect(Policy::none()) // Disable redirects to prevent SSRF
        .build()?)
}

/// Reads the `exp` claim of an access token without verifying its signature.
fn jwt_expiry(access_token: &str) -> Option<f64> {
    let token: Token<Value, ExpiryClaims, _> = Token::parse_unverified(access_token).ok()?;
    token.claims().exp.map(|exp| exp as f64)
}

#[derive(Deserialize, Debug)]
struct ExpiryClaims {
    exp: Option<i64>,
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Refresh token must not be empty")]
    EmptyRefreshToken,

    #[error("SSO server rejected the refresh token: {0}")]
    Rejected(String),

    #[error("Failed to exchange refresh token: {0}")]
    TokenExchange(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("HTTP request failed: {0}")]
    ReqwestRequest(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] oauth2::url::ParseError),
}
