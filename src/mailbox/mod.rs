//! Mailbox operations: scan for work orders, fetch an attachment, mark a message read.
//!
//! Every operation opens its own session and closes it before returning,
//! whether the operation succeeded or not.

pub mod fetcher;
pub mod scanner;
pub mod status;

pub use fetcher::{fetch_bytes, fetch_to_workdir, FetchedAttachment};
pub use scanner::scan;
pub use status::{authenticate, mark_read};

use crate::mail::MailSession;

/// Close a session, logging instead of failing. The operation's own result wins.
async fn close_session<S: MailSession>(session: &mut S) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close mail session");
    }
}
