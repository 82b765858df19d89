//! Scan results: unread messages and the work-order attachments they carry.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The sender of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sender {
    /// Display name (may be empty).
    pub name: String,
    /// Bare address (`user@domain`).
    pub address: String,
}

impl Sender {
    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One matching attachment inside a message.
///
/// `part_id` is only meaningful together with the owning message id and mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRef {
    /// IMAP section number (`"2"`, `"1.2"`, …).
    pub part_id: String,
    pub filename: String,
    /// Lowercase `type/subtype`.
    pub media_type: String,
    /// Body size in its transfer encoding, so a base64 part counts its encoded
    /// length rather than the decoded file size.
    pub size_bytes: u64,
}

/// An unread message carrying at least one work-order spreadsheet.
///
/// Exists only for the duration of one scan response; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Mailbox-assigned identifier (IMAP UID in the scanned folder).
    pub id: u32,
    pub subject: String,
    pub sender: Sender,
    /// `Date:` header, falling back to the store's arrival time.
    pub received_at: Option<DateTime<Utc>>,
    /// Matching attachments in MIME traversal order. Never empty.
    pub attachments: Vec<AttachmentRef>,
}
