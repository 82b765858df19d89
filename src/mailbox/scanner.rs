//! Find unread messages carrying work-order spreadsheets.

use tracing::{debug, info, warn};

use super::close_session;
use crate::error::Result;
use crate::mail::{MailSession, MailTransport, RawMessage};
use crate::model::credentials::MailCredentials;
use crate::model::message::MessageSummary;
use crate::parser::header::parse_envelope;
use crate::parser::mime::{select_attachments, AttachmentFilter};

/// Scan `folder` for unread messages with at least one matching attachment.
///
/// Read-only: no flag in the store changes. Messages whose headers cannot be
/// parsed are logged and left out; they never fail the scan.
pub async fn scan<T: MailTransport>(
    transport: &T,
    credentials: &MailCredentials,
    folder: &str,
    filter: &AttachmentFilter,
) -> Result<Vec<MessageSummary>> {
    let mut session = transport.connect(credentials).await?;
    let listed = session.list_unseen(folder).await;
    close_session(&mut session).await;

    let raw = listed?;
    let unseen = raw.len();
    let summaries = summarize(raw, filter);
    info!(
        folder,
        unseen,
        matching = summaries.len(),
        prefix = filter.prefix(),
        "Scanned mailbox"
    );
    Ok(summaries)
}

/// Turn listed messages into summaries, dropping those without a match.
pub fn summarize(messages: Vec<RawMessage>, filter: &AttachmentFilter) -> Vec<MessageSummary> {
    messages
        .into_iter()
        .filter_map(|msg| summarize_one(msg, filter))
        .collect()
}

fn summarize_one(msg: RawMessage, filter: &AttachmentFilter) -> Option<MessageSummary> {
    let attachments = select_attachments(&msg.structure, filter);
    if attachments.is_empty() {
        debug!(uid = msg.id, "No matching attachment");
        return None;
    }

    let envelope = match parse_envelope(&msg.header) {
        Ok(env) => env,
        Err(e) => {
            warn!(uid = msg.id, error = %e, "Skipping message with unreadable headers");
            return None;
        }
    };

    Some(MessageSummary {
        id: msg.id,
        subject: envelope.subject,
        sender: envelope.sender,
        received_at: envelope.date.or(msg.internal_date),
        attachments,
    })
}
