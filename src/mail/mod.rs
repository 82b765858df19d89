//! Mail store and relay access.
//!
//! The mailbox operations only talk to a store through [`MailTransport`] and
//! [`MailSession`]. [`imap::ImapTransport`] is the production implementation;
//! [`memory::MemoryMailbox`] is an in-process store used by tests and demos.

pub mod imap;
pub mod memory;
pub mod smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::credentials::MailCredentials;
use crate::model::mime::MimePart;

pub use smtp::{OutboundMail, SmtpSender};

/// What a scan needs to know about one unread message, before any body is downloaded.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Store-assigned identifier (IMAP UID).
    pub id: u32,
    pub structure: MimePart,
    /// Raw RFC 5322 header block.
    pub header: Vec<u8>,
    /// Arrival time recorded by the store.
    pub internal_date: Option<DateTime<Utc>>,
}

/// Opens authenticated sessions against a mail store.
#[async_trait]
pub trait MailTransport: Send + Sync {
    type Session: MailSession;

    /// Open a secured, authenticated session.
    ///
    /// Rejected credentials fail with `Auth` carrying the store's response text.
    async fn connect(&self, credentials: &MailCredentials) -> Result<Self::Session>;
}

/// One authenticated session. Callers must call [`MailSession::close`] on every path.
#[async_trait]
pub trait MailSession: Send {
    /// Unread messages of `folder`, without changing any flag.
    async fn list_unseen(&mut self, folder: &str) -> Result<Vec<RawMessage>>;

    /// Full raw message, without changing any flag. `None` if the id does not exist.
    async fn fetch_raw(&mut self, folder: &str, id: u32) -> Result<Option<Vec<u8>>>;

    /// Add the seen flag. A missing or already-seen message is not an error.
    async fn set_seen(&mut self, folder: &str, id: u32) -> Result<()>;

    /// Log out and release the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Sends mail on behalf of a mailbox owner. Implementations may block.
pub trait MailRelay: Send + Sync {
    fn send(&self, credentials: &MailCredentials, mail: &OutboundMail) -> Result<()>;
}
