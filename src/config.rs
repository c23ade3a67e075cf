//! Application configuration.
//!
//! Configuration is loaded from the first file found at:
//! 1. `--config PATH` or `$MAILCAST_CONFIG`
//! 2. `./mailcast.toml`
//! 3. `./settings.txt` (legacy positional format)
//! 4. `~/.config/mailcast/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailcast\config.toml` (Windows)
//!
//! Relative paths inside the file are resolved against the file's
//! directory. Every field is checked at load time so a bad value fails
//! before anything is sent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compose::{parse_address, parse_mailbox};
use crate::error::{Error, Result};
use crate::model::draft::split_recipients;
use crate::transport::provider::{ProviderSettings, DEFAULT_API_BASE};
use crate::transport::relay::{RelaySettings, TlsMode, DEFAULT_PORT};
use crate::transport::PROVIDER_HOST;

/// Legacy file name searched in the working directory.
pub const LEGACY_FILE_NAME: &str = "settings.txt";

/// Zero-based line numbers of the legacy settings file, in field order:
/// sender, to, recipients file, subject, display name, server, HTML file,
/// plain body.
const LEGACY_LINES: [usize; 8] = [1, 4, 7, 10, 13, 16, 19, 22];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// What to send.
    pub message: MessageConfig,
    /// Which transport to use.
    pub delivery: DeliveryConfig,
    /// SMTP relay settings (relay mode).
    #[serde(default)]
    pub relay: RelayConfig,
    /// Provider API settings (provider mode).
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Log level and log directory.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File this configuration was read from.
    #[serde(skip)]
    pub source: PathBuf,
}

/// Message contents and addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Sender address; also the provider account id.
    pub sender: String,
    /// Display name for the `From:` header.
    #[serde(default)]
    pub display_name: Option<String>,
    pub subject: String,
    /// Comma-separated recipients for the single relay send.
    #[serde(default)]
    pub to: Option<String>,
    /// One recipient per line, one message each (provider mode).
    #[serde(default)]
    pub recipients_file: Option<PathBuf>,
    /// File holding the HTML body.
    pub html_file: PathBuf,
    /// Plain-text alternative body.
    #[serde(default)]
    pub plain_body: String,
}

/// Transport selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Relay host name, or `"google.com"` for the provider API.
    pub server: String,
}

/// SMTP relay settings. The host is [`DeliveryConfig::server`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub port: u16,
    /// "none", "starttls" or "wrapper".
    pub tls: TlsMode,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Skip certificate verification (self-signed relays).
    pub accept_invalid_certs: bool,
}

/// Provider API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Token cache file (binary).
    pub token_cache: PathBuf,
    /// OAuth client secret JSON.
    pub client_secret: PathBuf,
    /// API root URL.
    pub api_base: String,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,
    /// Override directory for the log file.
    pub cache_dir: Option<PathBuf>,
}

/// Which delivery path the configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One message per recipient through the provider API.
    Provider,
    /// One message to the `to` list through the SMTP relay.
    Relay,
}

// ── Default implementations ─────────────────────────────────────

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tls: TlsMode::None,
            username: None,
            password: None,
            accept_invalid_certs: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let defaults = ProviderSettings::default();
        Self {
            token_cache: defaults.token_cache,
            client_secret: defaults.client_secret,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

// ── Accessors ───────────────────────────────────────────────────

impl Config {
    /// Provider when the server is the provider host literal, relay otherwise.
    pub fn transport_kind(&self) -> TransportKind {
        if self.delivery.server == PROVIDER_HOST {
            TransportKind::Provider
        } else {
            TransportKind::Relay
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            host: self.delivery.server.clone(),
            port: self.relay.port,
            tls: self.relay.tls,
            username: self.relay.username.clone(),
            password: self.relay.password.clone(),
            accept_invalid_certs: self.relay.accept_invalid_certs,
        }
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            token_cache: self.provider.token_cache.clone(),
            client_secret: self.provider.client_secret.clone(),
            api_base: self.provider.api_base.clone(),
        }
    }

    /// Parse the TOML format. Paths are left as written.
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self> {
        let mut config: Self =
            toml::from_str(contents).map_err(|e| Error::config(path, e.to_string()))?;
        config.source = path.to_path_buf();
        Ok(config)
    }

    /// Parse the legacy positional format: eight values on fixed lines.
    pub fn from_legacy_str(contents: &str, path: &Path) -> Result<Self> {
        let lines: Vec<&str> = contents.lines().collect();
        let needed = LEGACY_LINES[LEGACY_LINES.len() - 1] + 1;
        if lines.len() < needed {
            return Err(Error::config(
                path,
                format!(
                    "legacy settings need at least {needed} lines, found {}",
                    lines.len()
                ),
            ));
        }
        let field = |i: usize| lines[LEGACY_LINES[i]].trim_end_matches('\r').to_string();
        let optional = |i: usize| Some(field(i)).filter(|v| !v.trim().is_empty());

        Ok(Self {
            message: MessageConfig {
                sender: field(0),
                to: optional(1),
                recipients_file: optional(2).map(PathBuf::from),
                subject: field(3),
                display_name: optional(4),
                html_file: PathBuf::from(field(6)),
                plain_body: field(7),
            },
            delivery: DeliveryConfig { server: field(5) },
            relay: RelayConfig::default(),
            provider: ProviderConfig::default(),
            logging: LoggingConfig::default(),
            source: path.to_path_buf(),
        })
    }

    /// Make every relative path relative to `base` instead of the working directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.message.html_file);
        if let Some(p) = self.message.recipients_file.as_mut() {
            resolve(p);
        }
        resolve(&mut self.provider.token_cache);
        resolve(&mut self.provider.client_secret);
        if let Some(p) = self.logging.cache_dir.as_mut() {
            resolve(p);
        }
    }

    /// Check every field the selected transport needs.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: String| Err(Error::config(path, reason));

        if let Err(e) = parse_address(&self.message.sender) {
            return invalid(format!("message.sender: {e}"));
        }
        if self.message.subject.trim().is_empty() {
            return invalid("message.subject is empty".into());
        }
        if self.message.html_file.as_os_str().is_empty() {
            return invalid("message.html_file is empty".into());
        }
        if self.delivery.server.trim().is_empty() {
            return invalid("delivery.server is empty".into());
        }

        match self.transport_kind() {
            TransportKind::Provider => {
                if self.message.recipients_file.is_none() {
                    return invalid("message.recipients_file is required for provider delivery".into());
                }
                if url::Url::parse(&self.provider.api_base).is_err() {
                    return invalid(format!(
                        "provider.api_base '{}' is not a URL",
                        self.provider.api_base
                    ));
                }
            }
            TransportKind::Relay => {
                let to = self.message.to.as_deref().unwrap_or_default();
                if split_recipients(to).next().is_none() {
                    return invalid("message.to is required for relay delivery".into());
                }
                for addr in split_recipients(to) {
                    if let Err(e) = parse_mailbox(addr) {
                        return invalid(format!("message.to: {e}"));
                    }
                }
                if self.relay.port == 0 {
                    return invalid("relay.port must be non-zero".into());
                }
            }
        }
        Ok(())
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Read, resolve and validate the configuration at `path`.
///
/// Files ending in `.toml` use the structured format; anything else is read
/// as a legacy positional settings file.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let mut config = if is_toml {
        Config::from_toml_str(&contents, path)?
    } else {
        tracing::info!(path = %path.display(), "Reading legacy positional settings");
        Config::from_legacy_str(&contents, path)?
    };

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    config.resolve_paths(base);
    config.validate(path)?;

    tracing::info!(path = %path.display(), server = %config.delivery.server, "Loaded config");
    Ok(config)
}

/// Determine the config file path.
///
/// An explicit path always wins, even if it does not exist (so the error
/// names it). Otherwise the first existing candidate is returned.
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = [PathBuf::from("mailcast.toml"), PathBuf::from(LEGACY_FILE_NAME)];
    if let Some(found) = local.into_iter().find(|p| p.exists()) {
        return Some(found);
    }

    dirs::config_dir()
        .map(|d| d.join("mailcast").join("config.toml"))
        .filter(|p| p.exists())
}

/// Return the cache directory for logs.
pub fn cache_dir(logging: &LoggingConfig) -> PathBuf {
    if let Some(ref dir) = logging.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailcast")
}
