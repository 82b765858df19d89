//! Credential checks and read-status changes.

use super::close_session;
use crate::error::Result;
use crate::mail::{MailSession, MailTransport};
use crate::model::credentials::MailCredentials;

/// Open and immediately close a session to check credentials.
pub async fn authenticate<T: MailTransport>(
    transport: &T,
    credentials: &MailCredentials,
) -> Result<()> {
    let mut session = transport.connect(credentials).await?;
    close_session(&mut session).await;
    tracing::info!(user = %credentials.address, "Credentials accepted");
    Ok(())
}

/// Flag a message as seen. Marking an already-seen or vanished message succeeds.
pub async fn mark_read<T: MailTransport>(
    transport: &T,
    credentials: &MailCredentials,
    folder: &str,
    message_id: u32,
) -> Result<()> {
    let mut session = transport.connect(credentials).await?;
    let result = session.set_seen(folder, message_id).await;
    close_session(&mut session).await;
    result?;
    tracing::info!(uid = message_id, folder, "Marked message as read");
    Ok(())
}
