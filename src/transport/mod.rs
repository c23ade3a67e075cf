//! Delivery backends.
//!
//! Two network transports exist: an SMTP relay and the Gmail send API.
//! Which one is used is decided by comparing the configured server name
//! against [`PROVIDER_HOST`]. The outbox transport writes `.eml` files
//! for dry runs.

pub mod outbox;
pub mod provider;
pub mod relay;

use std::fmt;
use std::path::PathBuf;

use lettre::address::Envelope;
use lettre::Message;

use crate::compose::{parse_address, parse_mailbox};
use crate::error::Result;
use crate::model::draft::split_recipients;

/// Server name that selects the provider transport instead of a relay.
pub const PROVIDER_HOST: &str = "google.com";

/// Something that can deliver a composed message.
pub trait Transport {
    /// Deliver `message` to the recipients named in `envelope`.
    fn send(&mut self, message: &Message, envelope: &Envelope) -> Result<Delivery>;
}

/// Receipt for one delivered message.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Accepted by an SMTP relay; holds the server's final reply text.
    Relayed { response: String },
    /// Accepted by the provider API.
    Provider {
        id: String,
        thread_id: Option<String>,
    },
    /// Written to disk instead of being sent.
    Saved { path: PathBuf },
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Relayed { response } => write!(f, "relay accepted: {response}"),
            Delivery::Provider { id, .. } => write!(f, "Message Id: {id}"),
            Delivery::Saved { path } => write!(f, "saved to {}", path.display()),
        }
    }
}

/// Build the SMTP envelope for `sender` and a comma-separated recipient list.
///
/// Recipients may carry a display name (`Bob <bob@example.com>`); only the
/// address goes into the envelope.
pub fn envelope_for(sender: &str, to_csv: &str) -> Result<Envelope> {
    let from = parse_address(sender)?;
    let to = split_recipients(to_csv)
        .map(|raw| parse_mailbox(raw).map(|mailbox| mailbox.email))
        .collect::<Result<Vec<_>>>()?;
    Ok(Envelope::new(Some(from), to)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_splits_recipients() {
        let env = envelope_for("me@example.com", "a@x.com, b@y.com").unwrap();
        assert_eq!(env.from().map(|a| a.to_string()).as_deref(), Some("me@example.com"));
        let to: Vec<String> = env.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["a@x.com", "b@y.com"]);
    }

    #[test]
    fn test_envelope_strips_display_names() {
        let env = envelope_for("me@example.com", "Bob <bob@x.com>, \"Carol C\" <carol@y.com>").unwrap();
        let to: Vec<String> = env.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["bob@x.com", "carol@y.com"]);
    }

    #[test]
    fn test_envelope_needs_a_recipient() {
        assert!(envelope_for("me@example.com", "").is_err());
    }

    #[test]
    fn test_delivery_display() {
        let d = Delivery::Provider {
            id: "18c2".into(),
            thread_id: None,
        };
        assert_eq!(d.to_string(), "Message Id: 18c2");
    }
}
