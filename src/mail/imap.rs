//! IMAP over implicit TLS (async-imap + tokio-native-tls).

use std::time::Duration;

use async_imap::error::Error as ImapError;
use async_imap::imap_proto::{BodyParams, BodyStructure, ContentDisposition};
use async_imap::types::Fetch;
use async_imap::Session;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_native_tls::native_tls;
use tokio_native_tls::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

use super::{MailSession, MailTransport, RawMessage};
use crate::config::MailConfig;
use crate::error::{Result, SheetmailError};
use crate::model::credentials::MailCredentials;
use crate::model::mime::{child_part_id, MimePart};
use crate::parser::mime::{filename_from_params, MAX_DEPTH};

type ImapStream = Compat<TlsStream<TcpStream>>;

const SCAN_QUERY: &str = "(UID BODYSTRUCTURE INTERNALDATE BODY.PEEK[HEADER])";

/// Connects to an IMAP store over implicit TLS.
#[derive(Debug, Clone, Default)]
pub struct ImapTransport {
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ImapTransport {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            timeout: config.timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    type Session = ImapSession;

    async fn connect(&self, credentials: &MailCredentials) -> Result<ImapSession> {
        let open = open_session(credentials, self.accept_invalid_certs);
        let session = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, open).await.map_err(|_| {
                SheetmailError::Transport(format!(
                    "connecting to {}:{} timed out after {}s",
                    credentials.host,
                    credentials.port,
                    limit.as_secs()
                ))
            })??,
            None => open.await?,
        };
        debug!(host = %credentials.host, user = %credentials.address, "IMAP session opened");
        Ok(ImapSession { session })
    }
}

async fn open_session(
    credentials: &MailCredentials,
    accept_invalid_certs: bool,
) -> Result<Session<ImapStream>> {
    let host = credentials.host.as_str();
    let unreachable_err =
        |e: &dyn std::fmt::Display| SheetmailError::Transport(format!("cannot reach {host}:{}: {e}", credentials.port));

    let tcp = TcpStream::connect((host, credentials.port))
        .await
        .map_err(|e| unreachable_err(&e))?;
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| unreachable_err(&e))?;
    let tls = tokio_native_tls::TlsConnector::from(tls);
    let tls_stream = tls.connect(host, tcp).await.map_err(|e| unreachable_err(&e))?;

    let client = async_imap::Client::new(tls_stream.compat());
    client
        .login(&credentials.address, &credentials.secret)
        .await
        .map_err(|(e, _client)| login_error(e))
}

/// NO/BAD on LOGIN is a credential rejection; anything else is the connection.
fn login_error(e: ImapError) -> SheetmailError {
    match e {
        ImapError::No(msg) | ImapError::Bad(msg) => SheetmailError::Auth(msg.trim().to_string()),
        other => SheetmailError::Transport(format!("login failed: {other}")),
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    session: Session<ImapStream>,
}

impl ImapSession {
    async fn fetch_summary(&mut self, uid: u32) -> std::result::Result<Option<RawMessage>, ImapError> {
        let fetches: Vec<Fetch> = self
            .session
            .uid_fetch(uid.to_string(), SCAN_QUERY)
            .await?
            .try_collect()
            .await?;
        let Some(fetch) = fetches.iter().find(|f| f.uid == Some(uid)) else {
            warn!(uid, "No FETCH response for message, skipping");
            return Ok(None);
        };
        let Some(body) = fetch.bodystructure() else {
            warn!(uid, "FETCH response without BODYSTRUCTURE, skipping");
            return Ok(None);
        };
        Ok(Some(RawMessage {
            id: uid,
            structure: convert_structure(body),
            header: fetch.header().map(<[u8]>::to_vec).unwrap_or_default(),
            internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        }))
    }
}

/// Failures that concern one message's response rather than the connection.
fn is_message_error(e: &ImapError) -> bool {
    matches!(e, ImapError::Parse(_) | ImapError::No(_) | ImapError::Bad(_))
}

#[async_trait]
impl MailSession for ImapSession {
    async fn list_unseen(&mut self, folder: &str) -> Result<Vec<RawMessage>> {
        // EXAMINE opens the folder read-only, so nothing here can touch \Seen.
        self.session.examine(folder).await?;

        let mut uids: Vec<u32> = self.session.uid_search("UNSEEN").await?.into_iter().collect();
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        uids.sort_unstable();

        // One FETCH per message, so a response the parser chokes on costs
        // only that message.
        let mut messages = Vec::with_capacity(uids.len());
        for &uid in &uids {
            match self.fetch_summary(uid).await {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(e) if is_message_error(&e) => {
                    warn!(uid, error = %e, "Unreadable FETCH response, skipping message");
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(folder, unseen = uids.len(), fetched = messages.len(), "Listed unseen messages");
        Ok(messages)
    }

    async fn fetch_raw(&mut self, folder: &str, id: u32) -> Result<Option<Vec<u8>>> {
        self.session.examine(folder).await?;
        let fetches: Vec<Fetch> = self
            .session
            .uid_fetch(id.to_string(), "(UID BODY.PEEK[])")
            .await?
            .try_collect()
            .await?;
        Ok(fetches
            .iter()
            .find(|f| f.uid == Some(id))
            .and_then(|f| f.body())
            .map(<[u8]>::to_vec))
    }

    async fn set_seen(&mut self, folder: &str, id: u32) -> Result<()> {
        self.session.select(folder).await?;
        let _updates: Vec<Fetch> = self
            .session
            .uid_store(id.to_string(), "+FLAGS (\\Seen)")
            .await?
            .try_collect()
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session.logout().await?;
        Ok(())
    }
}

/// Convert a `BODYSTRUCTURE` response into a section-numbered part tree.
pub fn convert_structure(body: &BodyStructure<'_>) -> MimePart {
    let root_id = match body {
        BodyStructure::Multipart { .. } => String::new(),
        _ => "1".to_string(),
    };
    convert(body, root_id, 0)
}

fn convert(body: &BodyStructure<'_>, part_id: String, depth: usize) -> MimePart {
    match body {
        BodyStructure::Multipart { common, bodies, .. } => {
            let mut node = describe(
                part_id,
                &common.ty.ty,
                &common.ty.subtype,
                params(&common.ty.params),
                common.disposition.as_ref().map(disposition),
            );
            if depth < MAX_DEPTH {
                for (i, child) in bodies.iter().enumerate() {
                    let id = child_part_id(&node.part_id, i + 1);
                    node.children.push(convert(child, id, depth + 1));
                }
            }
            node
        }
        // message/rfc822 parts are treated as opaque leaves
        BodyStructure::Basic { common, other, .. }
        | BodyStructure::Text { common, other, .. }
        | BodyStructure::Message { common, other, .. } => {
            let mut node = describe(
                part_id,
                &common.ty.ty,
                &common.ty.subtype,
                params(&common.ty.params),
                common.disposition.as_ref().map(disposition),
            );
            node.size = u64::from(other.octets);
            node
        }
    }
}

fn params(p: &BodyParams<'_>) -> Vec<(String, String)> {
    p.as_ref()
        .map(|list| {
            list.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn disposition(d: &ContentDisposition<'_>) -> (String, Vec<(String, String)>) {
    (d.ty.to_string(), params(&d.params))
}

/// Build a part node from already-extracted structure fields.
fn describe(
    part_id: String,
    ty: &str,
    subtype: &str,
    type_params: Vec<(String, String)>,
    disposition: Option<(String, Vec<(String, String)>)>,
) -> MimePart {
    let mut node = MimePart::leaf(part_id, format!("{ty}/{subtype}"));
    let (disp_type, disp_params) = match disposition {
        Some((ty, params)) => (Some(ty.to_ascii_lowercase()), params),
        None => (None, Vec::new()),
    };
    node.disposition = disp_type;
    node.filename = filename_from_params(&disp_params, &type_params);
    node
}
