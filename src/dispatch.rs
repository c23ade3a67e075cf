//! The send loop.
//!
//! Provider mode composes one message per recipient from a template draft,
//! stops after [`SEND_LIMIT`] messages and pauses [`SEND_PAUSE`] between
//! sends. Relay mode composes a single message for the configured `to`
//! list and submits it once. The first error aborts the run; messages
//! already sent stay sent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compose::compose;
use crate::config::{Config, TransportKind};
use crate::error::{Error, Result};
use crate::model::draft::Draft;
use crate::transport::{envelope_for, Delivery, Transport};

/// Maximum provider sends per run (the provider's daily quota, with margin).
pub const SEND_LIMIT: usize = 450;

/// Pause between provider sends, to stay under the provider's send rate.
pub const SEND_PAUSE: Duration = Duration::from_millis(400);

/// Send cap and pause between consecutive sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub limit: usize,
    pub pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            limit: SEND_LIMIT,
            pause: SEND_PAUSE,
        }
    }
}

impl Pacing {
    /// Same cap, no pause (for writing to disk).
    pub fn unpaced() -> Self {
        Self {
            pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Who receives the message.
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    /// One message per address, in file order.
    Each(Vec<String>),
    /// A single message to the template's own `to` list.
    Once,
}

/// A template draft plus its audience.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub template: Draft,
    pub audience: Audience,
}

/// What a run did.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Recipient string and receipt for every message sent, in order.
    pub deliveries: Vec<(String, Delivery)>,
    /// `true` if recipients were left unsent because of the cap.
    pub limit_reached: bool,
}

/// One finished send, as reported to the progress callback.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Messages sent so far, this one included.
    pub sent: usize,
    /// Messages the run will send in total.
    pub planned: usize,
    pub recipient: &'a str,
    pub delivery: &'a Delivery,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.deliveries.len()
    }
}

/// Read a recipient list: one address per line, trimmed, blank lines skipped.
pub fn read_recipients(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Build the campaign described by `config`.
///
/// Reads the HTML body and, in provider mode, the recipient file.
/// Attachment files are not read until each message is composed.
pub fn prepare(config: &Config, attachments: &[PathBuf]) -> Result<Campaign> {
    let msg = &config.message;
    let html = std::fs::read_to_string(&msg.html_file).map_err(|e| Error::io(&msg.html_file, e))?;

    let mut template = Draft::new(
        msg.sender.clone(),
        msg.to.clone().unwrap_or_default(),
        msg.subject.clone(),
    );
    template.display_name = msg.display_name.clone();
    template.html = html;
    template.plain = msg.plain_body.clone();
    template.attachments = attachments.to_vec();

    let audience = match (config.transport_kind(), &msg.recipients_file) {
        (TransportKind::Provider, Some(path)) => Audience::Each(read_recipients(path)?),
        (TransportKind::Provider, None) => {
            return Err(Error::config(
                &config.source,
                "message.recipients_file is required for provider delivery",
            ))
        }
        (TransportKind::Relay, _) => Audience::Once,
    };

    Ok(Campaign { template, audience })
}

impl Campaign {
    /// Number of messages a full run will send.
    pub fn planned(&self, pacing: &Pacing) -> usize {
        match &self.audience {
            Audience::Each(list) => list.len().min(pacing.limit),
            Audience::Once => 1,
        }
    }

    /// Compose and deliver every message.
    ///
    /// `pause` is called between consecutive sends; `progress` is called
    /// after each one.
    pub fn run(
        &self,
        transport: &mut dyn Transport,
        pacing: Pacing,
        pause: &mut dyn FnMut(Duration),
        progress: &dyn Fn(Progress<'_>),
    ) -> Result<DispatchReport> {
        match &self.audience {
            Audience::Each(recipients) => {
                send_each(&self.template, recipients, transport, pacing, pause, progress)
            }
            Audience::Once => {
                let report = send_once(&self.template, transport)?;
                if let Some((recipient, delivery)) = report.deliveries.first() {
                    progress(Progress {
                        sent: 1,
                        planned: 1,
                        recipient,
                        delivery,
                    });
                }
                Ok(report)
            }
        }
    }
}

/// One message per recipient, capped and paced.
pub fn send_each(
    template: &Draft,
    recipients: &[String],
    transport: &mut dyn Transport,
    pacing: Pacing,
    pause: &mut dyn FnMut(Duration),
    progress: &dyn Fn(Progress<'_>),
) -> Result<DispatchReport> {
    let planned = recipients.len().min(pacing.limit);
    let mut report = DispatchReport::default();

    for (i, recipient) in recipients.iter().enumerate() {
        if report.sent() >= pacing.limit {
            tracing::warn!(limit = pacing.limit, "Send limit reached, stopping");
            report.limit_reached = true;
            break;
        }
        if i > 0 {
            pause(pacing.pause);
        }

        tracing::info!(contact = i + 1, recipient = %recipient, "Sending");
        let draft = template.addressed_to(recipient);
        let message = compose(&draft)?;
        let envelope = envelope_for(&draft.sender, &draft.to)?;
        let delivery = transport.send(&message, &envelope)?;
        tracing::info!(contact = i + 1, "{delivery}");

        report.deliveries.push((recipient.clone(), delivery));
        if let Some((recipient, delivery)) = report.deliveries.last() {
            progress(Progress {
                sent: report.sent(),
                planned,
                recipient,
                delivery,
            });
        }
    }

    Ok(report)
}

/// One message to every address in the draft's `to` list.
pub fn send_once(draft: &Draft, transport: &mut dyn Transport) -> Result<DispatchReport> {
    let message = compose(draft)?;
    let envelope = envelope_for(&draft.sender, &draft.to)?;
    let delivery = transport.send(&message, &envelope)?;
    tracing::info!(to = %draft.to, "{delivery}");

    Ok(DispatchReport {
        deliveries: vec![(draft.to.clone(), delivery)],
        limit_reached: false,
    })
}
