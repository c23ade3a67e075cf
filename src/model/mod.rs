//! Message data model: drafts and attachment files.

pub mod attachment;
pub mod draft;
