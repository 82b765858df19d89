//! Outbound mail through an SMTP relay (lettre, blocking).
//!
//! [`SmtpSender`] blocks; call it from `spawn_blocking` inside the runtime.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};

use super::MailRelay;
use crate::config::MailConfig;
use crate::error::{Result, SheetmailError};
use crate::model::credentials::MailCredentials;

/// One message with a single file attached.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment_type: String,
    pub attachment: Vec<u8>,
}

/// SMTP relay settings. STARTTLS is required, except on port 465 (implicit TLS).
#[derive(Debug, Clone)]
pub struct SmtpSender {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl SmtpSender {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            timeout: config.timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }
}

impl MailRelay for SmtpSender {
    /// Send `mail` from the mailbox owner, authenticating with the same credentials.
    fn send(&self, credentials: &MailCredentials, mail: &OutboundMail) -> Result<()> {
        let message = build_message(&credentials.address, mail)?;

        let tls = TlsParameters::builder(self.host.clone())
            .dangerous_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| SheetmailError::Transport(format!("TLS setup failed: {e}")))?;
        let builder = SmtpTransport::builder_dangerous(&self.host)
            .port(self.port)
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .credentials(Credentials::new(
                credentials.address.clone(),
                credentials.secret.clone(),
            ))
            .timeout(self.timeout);
        let builder = if self.port == 465 {
            builder.tls(Tls::Wrapper(tls))
        } else {
            builder.tls(Tls::Required(tls))
        };

        builder.build().send(&message).map_err(smtp_error)?;
        tracing::info!(
            to = %mail.to,
            attachment = %mail.attachment_name,
            relay = %self.host,
            "Sent processed spreadsheet"
        );
        Ok(())
    }
}

/// Build the MIME message: a plain-text body plus the attachment.
pub fn build_message(from: &str, mail: &OutboundMail) -> Result<Message> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| SheetmailError::validation("email", format!("invalid sender address: {e}")))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| SheetmailError::validation("to", format!("invalid recipient address: {e}")))?;
    let content_type = ContentType::parse(&mail.attachment_type)
        .map_err(|e| SheetmailError::Transport(format!("invalid attachment type: {e}")))?;

    let attachment =
        Attachment::new(mail.attachment_name.clone()).body(mail.attachment.clone(), content_type);

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(attachment),
        )
        .map_err(|e| SheetmailError::Transport(format!("cannot build message: {e}")))
}

/// 535 is the relay rejecting the credentials; everything else is transport.
fn smtp_error(e: lettre::transport::smtp::Error) -> SheetmailError {
    match e.status() {
        Some(code) if code.to_string() == "535" => SheetmailError::Auth(e.to_string()),
        _ => SheetmailError::Transport(format!("SMTP send failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> OutboundMail {
        OutboundMail {
            to: "office@example.com".into(),
            subject: "Intervention report".into(),
            body: "Attached.".into(),
            attachment_name: "processed_WS-1.xlsx".into(),
            attachment_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                .into(),
            attachment: b"PK\x03\x04".to_vec(),
        }
    }

    #[test]
    fn test_build_message() {
        let msg = build_message("tech@example.com", &mail()).unwrap();
        let text = String::from_utf8_lossy(&msg.formatted()).into_owned();
        assert!(text.contains("To: office@example.com"));
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("processed_WS-1.xlsx"));
    }

    #[test]
    fn test_bad_recipient_is_validation() {
        let mut m = mail();
        m.to = "not an address".into();
        let err = build_message("tech@example.com", &m).unwrap_err();
        assert!(matches!(err, SheetmailError::Validation { ref field, .. } if field == "to"));
    }
}
