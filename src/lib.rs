//! `mailcast` - send one HTML email to a list of recipients.
//!
//! This crate provides the message builder (plain/HTML alternative with
//! attachments), the SMTP relay and Gmail API transports, and the paced
//! send loop that ties them to a configuration file.

pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod transport;
