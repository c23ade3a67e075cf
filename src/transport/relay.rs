//! SMTP relay transport.
//!
//! One connection per send: connect, EHLO, optional STARTTLS + EHLO,
//! optional AUTH, MAIL/RCPT/DATA, QUIT.

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport as _};
use serde::{Deserialize, Serialize};

use super::{envelope_for, Delivery, Transport};
use crate::error::Result;

/// Default SMTP port when none is configured.
pub const DEFAULT_PORT: u16 = 25;

/// How the relay connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain SMTP.
    #[default]
    None,
    /// Plain connect, then upgrade with STARTTLS (required, not opportunistic).
    StartTls,
    /// TLS from the first byte (SMTPS, usually port 465).
    Wrapper,
}

/// Everything needed to reach and log into a relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept any server certificate, including self-signed ones.
    pub accept_invalid_certs: bool,
}

impl RelaySettings {
    /// Plain relay on the default port with no login.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            tls: TlsMode::None,
            username: None,
            password: None,
            accept_invalid_certs: false,
        }
    }
}

/// Login credentials, only when both username and password are non-empty.
pub fn relay_credentials(username: Option<&str>, password: Option<&str>) -> Option<Credentials> {
    match (username, password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            Some(Credentials::new(user.to_string(), pass.to_string()))
        }
        _ => None,
    }
}

/// Sends every message through the configured relay.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    settings: RelaySettings,
}

impl RelayTransport {
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings }
    }

    fn smtp_transport(&self) -> Result<SmtpTransport> {
        let host = &self.settings.host;
        let mut builder = SmtpTransport::builder_dangerous(host.as_str()).port(self.settings.port);

        match self.settings.tls {
            TlsMode::None => {}
            TlsMode::StartTls => {
                tracing::info!(port = self.settings.port, "Using STARTTLS for SMTP");
                builder = builder.tls(Tls::Required(self.tls_parameters()?));
            }
            TlsMode::Wrapper => {
                tracing::info!(port = self.settings.port, "Using implicit TLS for SMTP");
                builder = builder.tls(Tls::Wrapper(self.tls_parameters()?));
            }
        }

        if let Some(creds) = relay_credentials(
            self.settings.username.as_deref(),
            self.settings.password.as_deref(),
        ) {
            tracing::info!(
                user = self.settings.username.as_deref().unwrap_or_default(),
                "Supplying credentials for relay"
            );
            builder = builder.credentials(creds);
        }

        Ok(builder.build())
    }

    fn tls_parameters(&self) -> Result<TlsParameters> {
        if self.settings.accept_invalid_certs {
            tracing::warn!(host = %self.settings.host, "Relay certificate will not be verified");
        }
        Ok(TlsParameters::builder(self.settings.host.clone())
            .dangerous_accept_invalid_certs(self.settings.accept_invalid_certs)
            .build()?)
    }
}

impl Transport for RelayTransport {
    fn send(&mut self, message: &Message, envelope: &Envelope) -> Result<Delivery> {
        let transport = self.smtp_transport()?;
        tracing::debug!(
            host = %self.settings.host,
            port = self.settings.port,
            recipients = envelope.to().len(),
            "Submitting message to relay"
        );
        let response = transport.send_raw(envelope, &message.formatted())?;
        let response = response.message().collect::<Vec<_>>().join(" ");
        Ok(Delivery::Relayed { response })
    }
}

/// Submit `message` once to every address in `to_csv`.
pub fn send_via_relay(
    message: &Message,
    settings: &RelaySettings,
    sender: &str,
    to_csv: &str,
) -> Result<Delivery> {
    let envelope = envelope_for(sender, to_csv)?;
    RelayTransport::new(settings.clone()).send(message, &envelope)
}
