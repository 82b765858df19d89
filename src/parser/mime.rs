//! MIME structure handling: part trees, attachment selection and part extraction.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::header::{decode_charset, decode_encoded_words, decode_rfc2231, percent_decode};
use crate::config::ScanConfig;
use crate::error::{Result, SheetmailError};
use crate::model::message::AttachmentRef;
use crate::model::mime::{child_part_id, MimePart};

/// Maximum depth for recursive multipart descent (to prevent stack overflow on adversarial input).
pub const MAX_DEPTH: usize = 10;

/// Which attachment file names count as work-order spreadsheets.
///
/// Both the prefix and the extension match case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFilter {
    prefix: String,
    extensions: Vec<String>,
}

impl AttachmentFilter {
    pub fn new(prefix: &str, extensions: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{e}"))
            .collect();
        Self {
            prefix: prefix.to_lowercase(),
            extensions,
        }
    }

    /// Filter from configuration, with an optional per-request prefix.
    ///
    /// A missing or blank override falls back to the configured prefix.
    pub fn from_config(scan: &ScanConfig, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&scan.filename_prefix);
        Self::new(prefix, &scan.extensions)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, filename: &str) -> bool {
        let name = filename.trim().to_lowercase();
        name.starts_with(&self.prefix) && self.extensions.iter().any(|ext| name.ends_with(ext))
    }
}

/// Whether a leaf can be an attachment at all: an explicit `attachment`
/// disposition or any `application/*` body.
pub fn is_candidate(part: &MimePart) -> bool {
    !part.is_multipart()
        && (part.disposition.as_deref() == Some("attachment") || part.main_type() == "application")
}

/// Matching attachments of a message, in part-tree traversal order.
pub fn select_attachments(root: &MimePart, filter: &AttachmentFilter) -> Vec<AttachmentRef> {
    root.leaves()
        .into_iter()
        .filter(|part| is_candidate(part))
        .filter_map(|part| {
            let filename = part.filename.as_deref()?;
            filter.matches(filename).then(|| AttachmentRef {
                part_id: part.part_id.clone(),
                filename: filename.to_string(),
                media_type: part.media_type.clone(),
                size_bytes: part.size,
            })
        })
        .collect()
}

/// Look up a MIME parameter, honouring RFC 2231 extended values and
/// continuations (`name*`, `name*0*`, `name*1`, …) before the plain form.
///
/// Parameter names match case-insensitively.
pub fn param_value(params: &[(String, String)], name: &str) -> Option<String> {
    let get = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };

    if let Some(v) = get(&format!("{name}*")) {
        return Some(decode_rfc2231(v));
    }

    let mut charset: Option<&str> = None;
    let mut bytes = Vec::new();
    let mut found = false;
    for i in 0u32.. {
        if let Some(v) = get(&format!("{name}*{i}*")) {
            let mut v = v;
            if i == 0 {
                let mut fields = v.splitn(3, '\'');
                if let (Some(cs), Some(_lang), Some(rest)) = (fields.next(), fields.next(), fields.next()) {
                    charset = Some(cs);
                    v = rest;
                }
            }
            bytes.extend(percent_decode(v));
        } else if let Some(v) = get(&format!("{name}*{i}")) {
            bytes.extend_from_slice(v.as_bytes());
        } else {
            break;
        }
        found = true;
    }
    if found {
        return Some(match charset {
            Some(cs) => decode_charset(cs, &bytes),
            None => decode_encoded_words(&String::from_utf8_lossy(&bytes)),
        });
    }

    get(name).map(decode_encoded_words)
}

/// Attachment file name from disposition `filename`, else content-type `name`.
pub fn filename_from_params(
    disposition_params: &[(String, String)],
    content_type_params: &[(String, String)],
) -> Option<String> {
    param_value(disposition_params, "filename")
        .or_else(|| param_value(content_type_params, "name"))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Build the section-numbered part tree of a parsed message.
pub fn part_tree(msg: &Message<'_>) -> MimePart {
    match msg.parts.first() {
        Some(root) if matches!(root.body, PartType::Multipart(_)) => build(msg, 0, String::new(), 0),
        Some(_) => build(msg, 0, "1".to_string(), 0),
        None => MimePart::leaf("1", "text/plain"),
    }
}

fn build(msg: &Message<'_>, idx: usize, part_id: String, depth: usize) -> MimePart {
    let Some(part) = msg.parts.get(idx) else {
        return MimePart::leaf(part_id, "application/octet-stream");
    };
    let mut node = MimePart::leaf(part_id, media_type(part));
    node.disposition = part
        .content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase());
    node.filename = part.attachment_name().map(|n| n.trim().to_string());

    match &part.body {
        PartType::Multipart(children) => {
            if depth < MAX_DEPTH {
                for (i, child) in children.iter().enumerate() {
                    let id = child_part_id(&node.part_id, i + 1);
                    node.children.push(build(msg, *child, id, depth + 1));
                }
            }
        }
        _ => node.size = encoded_size(msg, part),
    }
    node
}

/// Body length in its transfer encoding, as an IMAP `BODYSTRUCTURE` reports it.
/// The line break that introduces the next boundary is not part of the body.
fn encoded_size(msg: &Message<'_>, part: &MessagePart<'_>) -> u64 {
    let (start, end) = (part.offset_body as usize, part.offset_end as usize);
    let Some(body) = msg.raw_message.get(start..end) else {
        return part.contents().len() as u64;
    };
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    body.len() as u64
}

fn media_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase()
}

/// Index into `msg.parts` of the part with the given section identifier.
fn locate(msg: &Message<'_>, part_id: &str) -> Option<usize> {
    let root = msg.parts.first()?;
    if !matches!(root.body, PartType::Multipart(_)) {
        return (part_id == "1").then_some(0);
    }
    let mut idx = 0;
    for segment in part_id.split('.') {
        let n: usize = segment.parse().ok()?;
        let PartType::Multipart(children) = &msg.parts.get(idx)?.body else {
            return None;
        };
        idx = *children.get(n.checked_sub(1)?)?;
    }
    Some(idx)
}

/// A decoded leaf part.
#[derive(Debug, Clone)]
pub struct ExtractedPart {
    pub filename: Option<String>,
    pub media_type: String,
    /// Transfer-decoded content.
    pub data: Vec<u8>,
}

/// Decode one part of a raw RFC 5322 message.
pub fn extract_part(raw_message: &[u8], part_id: &str) -> Result<ExtractedPart> {
    let msg = MessageParser::default()
        .parse(raw_message)
        .ok_or_else(|| SheetmailError::Mime("failed to parse message for part extraction".into()))?;

    let part = locate(&msg, part_id)
        .and_then(|idx| msg.parts.get(idx))
        .filter(|p| !matches!(p.body, PartType::Multipart(_)))
        .ok_or_else(|| SheetmailError::NotFound(format!("part {part_id} does not exist")))?;

    Ok(ExtractedPart {
        filename: part.attachment_name().map(|n| n.trim().to_string()),
        media_type: media_type(part),
        data: part.contents().to_vec(),
    })
}

/// Parse a raw message and return its part tree.
pub fn structure_of(raw_message: &[u8]) -> Result<MimePart> {
    let msg = MessageParser::default()
        .parse(raw_message)
        .ok_or_else(|| SheetmailError::Mime("failed to parse message structure".into()))?;
    Ok(part_tree(&msg))
}
