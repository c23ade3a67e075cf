//! OAuth2 plumbing for the provider transport.
//!
//! Supports the two token-endpoint grants the sender needs:
//!   1. Exchange an authorization code for tokens (first run).
//!   2. Refresh an expired access token.
//!
//! Getting the authorization code is host-dependent (browser, redirect
//! listener, copy-paste), so it sits behind the [`Authorizer`] trait.

use std::path::Path;

use chrono::{Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::token::Token;
use crate::error::{Error, Result};

/// Scope needed to send mail and nothing else.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Redirect used when the client secret lists none.
const FALLBACK_REDIRECT_URI: &str = "http://localhost";

/// OAuth client registration, as downloaded from the provider console.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// The downloaded file wraps the registration under its application type.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecret {
    /// Read a client-secret JSON file (`{"installed": {...}}` or `{"web": {...}}`).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&contents).map_err(|reason| Error::config(path, reason))
    }

    fn from_json(contents: &str) -> std::result::Result<Self, String> {
        let file: ClientSecretFile =
            serde_json::from_str(contents).map_err(|e| format!("not a client secret file: {e}"))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }

    /// First registered redirect URI.
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_REDIRECT_URI)
    }
}

/// Supplies a brand-new token when there is nothing cached to refresh.
///
/// `client` is the transport's own HTTP client, for the code exchange.
pub trait Authorizer {
    fn obtain_credential(&self, client: &Client, secret: &ClientSecret) -> Result<Token>;
}

impl<F> Authorizer for F
where
    F: Fn(&Client, &ClientSecret) -> Result<Token>,
{
    fn obtain_credential(&self, client: &Client, secret: &ClientSecret) -> Result<Token> {
        self(client, secret)
    }
}

/// Build the consent URL the user should open.
pub fn authorization_url(secret: &ClientSecret, scope: &str) -> Result<String> {
    let params = [
        ("client_id", secret.client_id.as_str()),
        ("redirect_uri", secret.redirect_uri()),
        ("response_type", "code"),
        ("scope", scope),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ];

    let url = url::Url::parse_with_params(&secret.auth_uri, &params)
        .map_err(|e| Error::Auth(format!("failed to build authorization URL: {e}")))?;
    Ok(url.to_string())
}

/// Exchange an authorization code for access + refresh tokens.
pub fn exchange_code(client: &Client, secret: &ClientSecret, code: &str) -> Result<Token> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::Auth("authorization code is empty".into()));
    }

    tracing::debug!("Exchanging authorization code for tokens");
    let params = [
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("code", code),
        ("redirect_uri", secret.redirect_uri()),
        ("grant_type", "authorization_code"),
    ];
    post_token_request(client, &secret.token_uri, &params)
}

/// Refresh an expired access token.
///
/// The endpoint does not always return a new refresh token; the old one is
/// kept in that case.
pub fn refresh(client: &Client, secret: &ClientSecret, refresh_token: &str) -> Result<Token> {
    if refresh_token.is_empty() {
        return Err(Error::Auth("no refresh token available".into()));
    }

    tracing::debug!("Refreshing access token");
    let params = [
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    let mut token = post_token_request(client, &secret.token_uri, &params)?;
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn post_token_request(client: &Client, token_uri: &str, params: &[(&str, &str)]) -> Result<Token> {
    let resp = client.post(token_uri).form(params).send()?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(Error::Auth(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            body.trim()
        )));
    }
    let parsed: TokenResponse = resp.json()?;
    Ok(token_from_response(parsed))
}

fn token_from_response(resp: TokenResponse) -> Token {
    let expires_at = resp.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
    Token {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_at,
        scope: resp.scope,
    }
}
