//! Gmail API transport.
//!
//! Messages are sent through `users.messages.send` as base64url-encoded
//! raw MIME. The account is identified by the sender address. Access
//! tokens come from a local cache, refreshed or re-authorized as needed
//! and written back before the first send.

pub mod oauth;
pub mod token;

use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use lettre::address::Envelope;
use lettre::Message;
use reqwest::blocking::Client;
use serde::Deserialize;

use self::oauth::{Authorizer, ClientSecret};
use self::token::{load_token, save_token, Token};
use super::{Delivery, Transport};
use crate::error::{Error, Result};

/// Public API endpoint.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// Where the provider keeps its local state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    /// Cached token, rewritten after every refresh or authorization.
    pub token_cache: PathBuf,
    /// Client registration, read only when a token must be refreshed or obtained.
    pub client_secret: PathBuf,
    /// API root, overridable for testing.
    pub api_base: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            token_cache: PathBuf::from("token.bin"),
            client_secret: PathBuf::from("credentials.json"),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub thread_id: Option<String>,
}

/// Sends through the provider API as one account.
pub struct ProviderTransport {
    client: Client,
    settings: ProviderSettings,
    account: String,
    authorizer: Box<dyn Authorizer>,
    token: Option<Token>,
}

impl ProviderTransport {
    pub fn new(
        settings: ProviderSettings,
        account: impl Into<String>,
        authorizer: Box<dyn Authorizer>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("mailcast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            settings,
            account: account.into(),
            authorizer,
            token: None,
        })
    }

    /// Return a usable token, loading, refreshing or authorizing as needed.
    ///
    /// Any new token is written to the cache before it is returned.
    pub fn ensure_token(&mut self) -> Result<&Token> {
        if let Some(token) = self.token.take().filter(Token::is_valid) {
            return Ok(self.token.insert(token));
        }

        let cached = load_token(&self.settings.token_cache)?;
        let token = match cached {
            Some(token) if token.is_valid() => token,
            Some(Token {
                refresh_token: Some(refresh_token),
                ..
            }) => {
                let secret = ClientSecret::load(&self.settings.client_secret)?;
                let token = oauth::refresh(&self.client, &secret, &refresh_token)
                    .inspect_err(|e| tracing::error!(error = %e, "Token refresh failed"))?;
                save_token(&self.settings.token_cache, &token)?;
                token
            }
            _ => {
                tracing::info!("No usable cached token, starting authorization");
                let secret = ClientSecret::load(&self.settings.client_secret)?;
                let token = self
                    .authorizer
                    .obtain_credential(&self.client, &secret)
                    .inspect_err(|e| tracing::error!(error = %e, "Authorization failed"))?;
                if token.access_token.is_empty() {
                    return Err(Error::Auth("authorizer returned an empty access token".into()));
                }
                save_token(&self.settings.token_cache, &token)?;
                token
            }
        };

        Ok(self.token.insert(token))
    }

    /// Submit one message and return the provider's ids for it.
    pub fn send_message(&mut self, message: &Message) -> Result<SentMessage> {
        let access_token = self.ensure_token()?.access_token.clone();
        let url = send_url(&self.settings.api_base, &self.account)?;
        let raw = URL_SAFE.encode(message.formatted());

        let result = self.post_send(url, &access_token, &raw);
        match &result {
            Ok(sent) => tracing::info!(id = %sent.id, "Message Id: {}", sent.id),
            Err(e) => tracing::error!(error = %e, "An error occurred while sending"),
        }
        result
    }

    fn post_send(&self, url: url::Url, access_token: &str, raw: &str) -> Result<SentMessage> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(resp.json()?)
    }
}

impl Transport for ProviderTransport {
    fn send(&mut self, message: &Message, _envelope: &Envelope) -> Result<Delivery> {
        let sent = self.send_message(message)?;
        Ok(Delivery::Provider {
            id: sent.id,
            thread_id: sent.thread_id,
        })
    }
}

/// `{api_base}/gmail/v1/users/{account}/messages/send`, with the account
/// percent-encoded as a path segment.
pub fn send_url(api_base: &str, account: &str) -> Result<url::Url> {
    let invalid = || Error::InvalidUrl(api_base.to_string());
    let mut url = url::Url::parse(api_base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["gmail", "v1", "users", account, "messages", "send"]);
    Ok(url)
}
