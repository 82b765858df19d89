//! Download one attachment of one message.

use tracing::info;

use super::close_session;
use crate::error::{Result, SheetmailError};
use crate::mail::{MailSession, MailTransport};
use crate::model::credentials::MailCredentials;
use crate::parser::mime::extract_part;
use crate::store::{WorkDir, WorkFile};

/// A decoded attachment.
#[derive(Debug, Clone)]
pub struct FetchedAttachment {
    pub filename: Option<String>,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Fetch and decode part `part_id` of message `message_id`.
///
/// Fails with `NotFound` if the message is gone or the part no longer resolves.
pub async fn fetch_bytes<T: MailTransport>(
    transport: &T,
    credentials: &MailCredentials,
    folder: &str,
    message_id: u32,
    part_id: &str,
) -> Result<FetchedAttachment> {
    let mut session = transport.connect(credentials).await?;
    let fetched = session.fetch_raw(folder, message_id).await;
    close_session(&mut session).await;

    let raw = fetched?.ok_or_else(|| {
        SheetmailError::NotFound(format!("message {message_id} is no longer in {folder}"))
    })?;
    let part = extract_part(&raw, part_id).map_err(|e| match e {
        SheetmailError::NotFound(_) => SheetmailError::NotFound(format!(
            "message {message_id} has no part {part_id}"
        )),
        other => other,
    })?;

    Ok(FetchedAttachment {
        filename: part.filename,
        media_type: part.media_type,
        data: part.data,
    })
}

/// Fetch an attachment and store it under a fresh name in `workdir`.
pub async fn fetch_to_workdir<T: MailTransport>(
    transport: &T,
    credentials: &MailCredentials,
    folder: &str,
    message_id: u32,
    part_id: &str,
    workdir: &WorkDir,
) -> Result<WorkFile> {
    let attachment = fetch_bytes(transport, credentials, folder, message_id, part_id).await?;
    let name = attachment
        .filename
        .unwrap_or_else(|| format!("message-{message_id}-part-{part_id}"));
    let file = workdir.write_new(&name, &attachment.data)?;
    info!(
        uid = message_id,
        part = part_id,
        handle = %file.handle,
        bytes = attachment.data.len(),
        "Fetched attachment"
    );
    Ok(file)
}
