//! Route handlers and their JSON wire types.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::SecondsFormat;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::ApiResult;
use super::AppState;
use crate::config::MailConfig;
use crate::error::{Result, SheetmailError};
use crate::mail::{MailTransport, OutboundMail};
use crate::mailbox;
use crate::model::credentials::MailCredentials;
use crate::model::message::MessageSummary;
use crate::model::workorder::WorkOrderForm;
use crate::parser::mime::AttachmentFilter;
use crate::sheet::{patch_form, read_details};
use crate::store::{display_name, spreadsheet_media_type};

// ── Requests ────────────────────────────────────────────────────

/// Mailbox credentials carried by every mailbox-facing request.
#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl CredentialsBody {
    /// Fill in the configured store endpoint where the request names none.
    pub fn resolve(&self, mail: &MailConfig) -> Result<MailCredentials> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(SheetmailError::validation("email", "is required"));
        }
        if self.password.trim().is_empty() {
            return Err(SheetmailError::validation("password", "is required"));
        }
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(&mail.imap_host);
        let port = self.port.unwrap_or(mail.imap_port);
        Ok(MailCredentials::new(email, self.password.as_str(), host, port))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEmailsRequest {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAttachmentRequest {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    #[serde(deserialize_with = "message_id")]
    pub email_id: u32,
    #[serde(alias = "partID")]
    pub part_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExcelRequest {
    #[serde(default)]
    pub file_path: String,
    #[serde(flatten)]
    pub form: WorkOrderForm,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadRequest {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    #[serde(deserialize_with = "message_id")]
    pub email_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub file: String,
}

/// Message ids arrive as JSON numbers from the list response, or as strings.
fn message_id<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(u64),
        Text(String),
    }

    let invalid = |shown: String| serde::de::Error::custom(format!("invalid emailId: {shown}"));
    match Id::deserialize(deserializer)? {
        Id::Num(n) => u32::try_from(n).map_err(|_| invalid(n.to_string())),
        Id::Text(s) => s.trim().parse::<u32>().map_err(|_| invalid(s)),
    }
}

// ── Responses ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailView {
    pub id: u32,
    pub subject: String,
    pub from: String,
    /// RFC 3339, UTC.
    pub date: Option<String>,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    #[serde(rename = "partID")]
    pub part_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

impl From<MessageSummary> for EmailView {
    fn from(m: MessageSummary) -> Self {
        Self {
            id: m.id,
            subject: m.subject,
            from: m.sender.display(),
            date: m
                .received_at
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            attachments: m
                .attachments
                .into_iter()
                .map(|a| AttachmentView {
                    part_id: a.part_id,
                    filename: a.filename,
                    content_type: a.media_type,
                    size: a.size_bytes,
                })
                .collect(),
        }
    }
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

// ── Handlers ────────────────────────────────────────────────────

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn authenticate<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let creds = req.resolve(&state.config.mail)?;
    mailbox::authenticate(&*state.transport, &creds).await?;
    Ok(success())
}

pub async fn fetch_emails<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<FetchEmailsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let creds = req.credentials.resolve(&state.config.mail)?;
    let filter = AttachmentFilter::from_config(&state.config.scan, req.file_prefix.as_deref());

    let summaries =
        mailbox::scan(&*state.transport, &creds, &state.config.mail.folder, &filter).await?;
    let emails: Vec<EmailView> = summaries.into_iter().map(EmailView::from).collect();
    Ok(Json(json!({ "success": true, "emails": emails })))
}

pub async fn download_attachment<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<DownloadAttachmentRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let creds = req.credentials.resolve(&state.config.mail)?;

    let file = mailbox::fetch_to_workdir(
        &*state.transport,
        &creds,
        &state.config.mail.folder,
        req.email_id,
        &req.part_id,
        &state.workdir,
    )
    .await?;

    let path = file.path.clone();
    let details = match tokio::task::spawn_blocking(move || read_details(&path)).await {
        Ok(Ok(details)) => details,
        Ok(Err(e)) => {
            warn!(handle = %file.handle, error = %e, "Could not pre-read details cell");
            None
        }
        Err(e) => {
            warn!(handle = %file.handle, error = %e, "Details pre-read task failed");
            None
        }
    };

    Ok(Json(json!({
        "success": true,
        "filePath": file.handle,
        "filename": file.original_name,
        "details": details,
    })))
}

pub async fn process_excel<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<ProcessExcelRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let source = state.workdir.resolve(&req.file_path)?;
    let form = req.form;

    let output = tokio::task::spawn_blocking(move || patch_form(&source, &form)).await??;
    let handle = state.workdir.handle_of(&output).ok_or_else(|| {
        SheetmailError::Transport(format!(
            "patched file landed outside the working directory: {}",
            output.display()
        ))
    })?;

    Ok(Json(json!({
        "success": true,
        "filePath": handle,
        "message": "Spreadsheet processed",
    })))
}

pub async fn send_email<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<SendEmailRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let creds = req.credentials.resolve(&state.config.mail)?;
    let outbound = &state.config.outbound;

    let to = non_blank(req.to)
        .or_else(|| non_blank(outbound.default_recipient.clone()))
        .ok_or_else(|| {
            SheetmailError::validation("to", "no recipient given and none configured")
        })?;
    let path = state.workdir.resolve(&req.file_path)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| SheetmailError::io(&path, e))?;

    let name = display_name(&req.file_path);
    let mail = OutboundMail {
        to,
        subject: non_blank(req.subject).unwrap_or_else(|| outbound.default_subject.clone()),
        body: non_blank(req.body).unwrap_or_else(|| outbound.default_body.clone()),
        attachment_type: spreadsheet_media_type(&name).to_string(),
        attachment_name: name,
        attachment: data,
    };

    let relay = state.relay.clone();
    tokio::task::spawn_blocking(move || relay.send(&creds, &mail)).await??;

    if let Err(e) = state.workdir.remove(&req.file_path) {
        warn!(handle = %req.file_path, error = %e, "Failed to remove sent file");
    }
    info!(handle = %req.file_path, "Sent processed spreadsheet");
    Ok(success())
}

pub async fn mark_as_read<T: MailTransport>(
    State(state): State<AppState<T>>,
    payload: std::result::Result<Json<MarkAsReadRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let creds = req.credentials.resolve(&state.config.mail)?;
    mailbox::mark_read(
        &*state.transport,
        &creds,
        &state.config.mail.folder,
        req.email_id,
    )
    .await?;
    Ok(success())
}

/// Serve a working file as a download. The file stays until the sweep removes it.
pub async fn download<T: MailTransport>(
    State(state): State<AppState<T>>,
    query: std::result::Result<Query<DownloadQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let path = state.workdir.resolve(&query.file)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| SheetmailError::io(&path, e))?;

    let name = display_name(&query.file);
    let headers = [
        (header::CONTENT_TYPE, spreadsheet_media_type(&name).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, data))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::model::message::{AttachmentRef, Sender};

    #[test]
    fn test_credentials_fall_back_to_config() {
        let body: CredentialsBody =
            serde_json::from_str(r#"{"email": " tech@example.com ", "password": "pw"}"#).unwrap();
        let creds = body.resolve(&MailConfig::default()).unwrap();
        assert_eq!(creds.address, "tech@example.com");
        assert_eq!(creds.host, "imap.gmail.com");
        assert_eq!(creds.port, 993);

        let body: CredentialsBody = serde_json::from_str(
            r#"{"email": "a@b.c", "password": "pw", "host": "mail.b.c", "port": 1993}"#,
        )
        .unwrap();
        let creds = body.resolve(&MailConfig::default()).unwrap();
        assert_eq!(creds.host, "mail.b.c");
        assert_eq!(creds.port, 1993);
    }

    #[test]
    fn test_credentials_require_email_and_password() {
        let body: CredentialsBody = serde_json::from_str(r#"{"password": "pw"}"#).unwrap();
        let err = body.resolve(&MailConfig::default()).unwrap_err();
        assert!(matches!(err, SheetmailError::Validation { ref field, .. } if field == "email"));

        let body: CredentialsBody = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        let err = body.resolve(&MailConfig::default()).unwrap_err();
        assert!(matches!(err, SheetmailError::Validation { ref field, .. } if field == "password"));
    }

    #[test]
    fn test_email_id_accepts_number_or_string() {
        let req: MarkAsReadRequest =
            serde_json::from_str(r#"{"email": "a@b.c", "password": "p", "emailId": 42}"#).unwrap();
        assert_eq!(req.email_id, 42);

        let req: MarkAsReadRequest =
            serde_json::from_str(r#"{"email": "a@b.c", "password": "p", "emailId": "42"}"#)
                .unwrap();
        assert_eq!(req.email_id, 42);

        let bad = serde_json::from_str::<MarkAsReadRequest>(
            r#"{"email": "a@b.c", "password": "p", "emailId": "x"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_part_id_alias() {
        let req: DownloadAttachmentRequest = serde_json::from_str(
            r#"{"email": "a@b.c", "password": "p", "emailId": 7, "partID": "2"}"#,
        )
        .unwrap();
        assert_eq!(req.part_id, "2");
        assert_eq!(req.email_id, 7);
    }

    #[test]
    fn test_process_request_carries_form() {
        let req: ProcessExcelRequest = serde_json::from_str(
            r#"{"filePath": "h.xlsx", "sinoffCode": 12, "startDay": "3", "solution": "ok"}"#,
        )
        .unwrap();
        assert_eq!(req.file_path, "h.xlsx");
        assert_eq!(req.form.sinoff_code, "12");
        assert_eq!(req.form.start_day, "3");
        assert_eq!(req.form.end_day, "");
        assert!(req.form.details.is_none());
    }

    #[test]
    fn test_email_view_shape() {
        let summary = MessageSummary {
            id: 9,
            subject: "WO 77".into(),
            sender: Sender {
                name: "Dispatch".into(),
                address: "dispatch@example.com".into(),
            },
            received_at: Some(Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap()),
            attachments: vec![AttachmentRef {
                part_id: "2".into(),
                filename: "WS-77.xlsx".into(),
                media_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                    .into(),
                size_bytes: 1234,
            }],
        };
        let value = serde_json::to_value(EmailView::from(summary)).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["from"], "Dispatch <dispatch@example.com>");
        assert_eq!(value["date"], "2024-03-04T09:15:00Z");
        assert_eq!(value["attachments"][0]["partID"], "2");
        assert_eq!(value["attachments"][0]["size"], 1234);
        assert!(value["attachments"][0].get("contentType").is_some());
    }
}
