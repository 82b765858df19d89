//! Header decoding: envelopes, RFC 2047 encoded-words and RFC 2231 parameter values.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use tracing::warn;

use crate::error::{Result, SheetmailError};
use crate::model::message::Sender;

/// The header fields a scan reports for each message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub subject: String,
    pub sender: Sender,
    pub date: Option<DateTime<Utc>>,
}

/// Parse the header block of a message.
///
/// A message without a usable `From:` address is rejected; everything else is optional.
pub fn parse_envelope(raw_headers: &[u8]) -> Result<Envelope> {
    let parser = MessageParser::default();
    let msg = parser
        .parse(raw_headers)
        .ok_or_else(|| SheetmailError::Mime("unparseable header block".into()))?;

    let from = msg
        .from()
        .and_then(|a| a.first())
        .ok_or_else(|| SheetmailError::Mime("missing From header".into()))?;
    let address = from
        .address()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SheetmailError::Mime("From header has no address".into()))?;

    Ok(Envelope {
        subject: msg.subject().unwrap_or_default().to_string(),
        sender: Sender {
            name: from.name().unwrap_or_default().trim().to_string(),
            address: address.to_string(),
        },
        date: msg.date().and_then(to_utc),
    })
}

fn to_utc(date: &mail_parser::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(date.to_timestamp(), 0)
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Values without encoded-words are returned as-is.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }
    // Wrap input in a minimal message so mail-parser applies its own decoder
    let fake_msg = format!("Subject: {input}\r\n\r\n");
    MessageParser::default()
        .parse(fake_msg.as_bytes())
        .and_then(|m| m.subject().map(str::to_string))
        .unwrap_or_else(|| input.to_string())
}

/// Decode an RFC 2231 extended value: `charset'language'percent-encoded`.
///
/// A value without the two quote delimiters is percent-decoded as UTF-8.
pub fn decode_rfc2231(value: &str) -> String {
    let mut fields = value.splitn(3, '\'');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(charset), Some(_lang), Some(encoded)) => {
            decode_charset(charset, &percent_decode(encoded))
        }
        _ => String::from_utf8_lossy(&percent_decode(value)).into_owned(),
    }
}

/// Decode `%XX` escapes. Malformed escapes are kept literally.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Decode bytes using a named charset.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_lowercase();
    match charset_lower.as_str() {
        "" | "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset_lower.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(charset = charset, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}
