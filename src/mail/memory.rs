//! In-process mail store.
//!
//! Behaves like a single-account IMAP server for the operations this crate
//! uses: UIDs are assigned on delivery, reads never change flags, and
//! sessions are counted so callers can check that every session was closed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{MailSession, MailTransport, RawMessage};
use crate::error::{Result, SheetmailError};
use crate::model::credentials::MailCredentials;
use crate::parser::mime::structure_of;

#[derive(Debug)]
struct Stored {
    raw: Vec<u8>,
    seen: bool,
    internal_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    address: String,
    secret: String,
    next_uid: u32,
    folders: BTreeMap<String, BTreeMap<u32, Stored>>,
    unavailable: bool,
    opened: usize,
    closed: usize,
}

/// A shared handle to an in-memory mailbox. Clones see the same store.
#[derive(Debug, Clone)]
pub struct MemoryMailbox {
    state: Arc<Mutex<State>>,
}

impl MemoryMailbox {
    /// A mailbox that accepts exactly these credentials.
    pub fn new(address: &str, secret: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                address: address.to_string(),
                secret: secret.to_string(),
                next_uid: 1,
                ..State::default()
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SheetmailError::Transport("mail store state poisoned".into()))?;
        Ok(f(&mut state))
    }

    /// Deliver an unread message and return its UID.
    pub fn deliver(&self, folder: &str, raw: impl Into<Vec<u8>>) -> Result<u32> {
        let raw = raw.into();
        self.with_state(|s| {
            let uid = s.next_uid;
            s.next_uid += 1;
            s.folders.entry(folder.to_string()).or_default().insert(
                uid,
                Stored {
                    raw,
                    seen: false,
                    internal_date: Utc::now(),
                },
            );
            uid
        })
    }

    /// Remove a message, as another client moving or deleting it would.
    pub fn remove(&self, folder: &str, uid: u32) -> Result<bool> {
        self.with_state(|s| {
            s.folders
                .get_mut(folder)
                .and_then(|f| f.remove(&uid))
                .is_some()
        })
    }

    /// Seen flag of a message, `None` if it does not exist.
    pub fn is_seen(&self, folder: &str, uid: u32) -> Result<Option<bool>> {
        self.with_state(|s| s.folders.get(folder).and_then(|f| f.get(&uid)).map(|m| m.seen))
    }

    /// Make every subsequent connect fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<()> {
        self.with_state(|s| s.unavailable = unavailable)
    }

    /// Sessions opened so far.
    pub fn sessions_opened(&self) -> Result<usize> {
        self.with_state(|s| s.opened)
    }

    /// Sessions opened but not yet closed.
    pub fn sessions_open(&self) -> Result<usize> {
        self.with_state(|s| s.opened - s.closed)
    }
}

#[async_trait]
impl MailTransport for MemoryMailbox {
    type Session = MemorySession;

    async fn connect(&self, credentials: &MailCredentials) -> Result<MemorySession> {
        self.with_state(|s| {
            if s.unavailable {
                return Err(SheetmailError::Transport("connection refused".into()));
            }
            if credentials.address != s.address || credentials.secret != s.secret {
                return Err(SheetmailError::Auth(
                    "[AUTHENTICATIONFAILED] Invalid credentials (Failure)".into(),
                ));
            }
            s.opened += 1;
            Ok(())
        })??;
        Ok(MemorySession {
            mailbox: self.clone(),
            open: true,
        })
    }
}

/// A session on a [`MemoryMailbox`].
#[derive(Debug)]
pub struct MemorySession {
    mailbox: MemoryMailbox,
    open: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(SheetmailError::Transport("session already closed".into()))
        }
    }
}

#[async_trait]
impl MailSession for MemorySession {
    async fn list_unseen(&mut self, folder: &str) -> Result<Vec<RawMessage>> {
        self.ensure_open()?;
        let unseen: Vec<(u32, Vec<u8>, DateTime<Utc>)> = self.mailbox.with_state(|s| {
            s.folders
                .get(folder)
                .map(|f| {
                    f.iter()
                        .filter(|(_, m)| !m.seen)
                        .map(|(uid, m)| (*uid, m.raw.clone(), m.internal_date))
                        .collect()
                })
                .unwrap_or_default()
        })?;

        let mut messages = Vec::with_capacity(unseen.len());
        for (id, raw, internal_date) in unseen {
            let structure = match structure_of(&raw) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(uid = id, error = %e, "Stored message has no readable structure");
                    continue;
                }
            };
            messages.push(RawMessage {
                id,
                structure,
                header: header_block(&raw).to_vec(),
                internal_date: Some(internal_date),
            });
        }
        Ok(messages)
    }

    async fn fetch_raw(&mut self, folder: &str, id: u32) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.mailbox.with_state(|s| {
            s.folders
                .get(folder)
                .and_then(|f| f.get(&id))
                .map(|m| m.raw.clone())
        })
    }

    async fn set_seen(&mut self, folder: &str, id: u32) -> Result<()> {
        self.ensure_open()?;
        self.mailbox.with_state(|s| {
            if let Some(m) = s.folders.get_mut(folder).and_then(|f| f.get_mut(&id)) {
                m.seen = true;
            }
        })
    }

    async fn close(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.open, false) {
            self.mailbox.with_state(|s| s.closed += 1)?;
        }
        Ok(())
    }
}

/// Header block of a raw message, including the terminating blank line.
fn header_block(raw: &[u8]) -> &[u8] {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    let end = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b).unwrap_or(raw.len()),
    };
    &raw[..end]
}
