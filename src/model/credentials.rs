//! Mailbox credentials supplied with every request.

use std::fmt;

/// Credentials for one mailbox session.
///
/// Never persisted. The secret is redacted from `Debug` output so credentials
/// can travel through `tracing` fields safely.
#[derive(Clone, PartialEq, Eq)]
pub struct MailCredentials {
    /// Login name, normally the email address.
    pub address: String,
    /// Password or application password.
    pub secret: String,
    /// IMAP host.
    pub host: String,
    /// IMAP port (993 for implicit TLS).
    pub port: u16,
}

impl MailCredentials {
    pub fn new(
        address: impl Into<String>,
        secret: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailCredentials")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}
