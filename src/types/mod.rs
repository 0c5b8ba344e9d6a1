//! Canonical message model and request/response shapes

mod folder;

pub use folder::LogicalFolder;

use serde::{Deserialize, Serialize};

use crate::autodiscovery::{DiscoverySource, ServerConfig};
use crate::error::{ConnectivityError, ErrorCode};
use crate::mime::{MessageHeaders, NormalizedMessage};

/// Attachment metadata; content is never downloaded into the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
    /// Content-ID without angle brackets, matching `cid:` references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

/// Canonical email record produced by both retrieval paths
///
/// `unread` and `has_attachments` are derived when the record is built and
/// cannot be set afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub from_name: String,
    /// RFC 3339, empty when unknown
    pub date: String,
    pub snippet: String,
    unread: bool,
    has_attachments: bool,
    pub body: String,
    attachments: Vec<Attachment>,
}

impl Email {
    /// Build a record from parsed headers and a normalized body
    ///
    /// `fallback_date` is the server-side receive time, used when the
    /// `Date` header is absent or unparseable.
    pub fn new(
        id: impl Into<String>,
        headers: MessageHeaders,
        content: NormalizedMessage,
        unread: bool,
        fallback_date: Option<String>,
    ) -> Self {
        let date = if headers.date.is_empty() {
            fallback_date.unwrap_or_default()
        } else {
            headers.date
        };
        let snippet = content.body.snippet();
        Self {
            id: id.into(),
            subject: headers.subject,
            from: headers.from,
            from_name: headers.from_name,
            date,
            snippet,
            unread,
            has_attachments: !content.attachments.is_empty(),
            body: content.body.into_body(),
            attachments: content.attachments,
        }
    }

    pub fn unread(&self) -> bool {
        self.unread
    }

    pub fn has_attachments(&self) -> bool {
        self.has_attachments
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

/// Output of one fetch call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Newest first
    pub emails: Vec<Email>,
    /// Messages dropped because they failed to fetch or parse
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    pub total: usize,
    pub unread: usize,
    pub folders: Vec<String>,
    pub provider: String,
    pub skipped: usize,
}

impl EmailStats {
    pub fn from_outcome(outcome: &FetchOutcome, folder: &LogicalFolder, provider: &str) -> Self {
        Self {
            total: outcome.emails.len(),
            unread: outcome.emails.iter().filter(|e| e.unread()).count(),
            folders: vec![folder.to_string()],
            provider: provider.to_string(),
            skipped: outcome.skipped,
        }
    }
}

/// Incoming connect payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    /// `gmail`, `outlook`, `yahoo`, `imap`; omitted means auto
    pub provider: Option<String>,
    pub folder: Option<String>,
    pub limit: Option<usize>,
    #[serde(flatten)]
    pub server: ServerOverride,
}

/// Explicit host settings that bypass discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOverride {
    pub imap_host: Option<String>,
    pub imap_port: Option<u16>,
    pub imap_tls: Option<bool>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_secure: Option<bool>,
}

impl ServerOverride {
    /// A forced config, present only when an IMAP host was given
    ///
    /// Missing ports follow the TLS flags; a missing SMTP host reuses the
    /// IMAP host.
    pub fn to_config(&self) -> Option<ServerConfig> {
        let imap_host = self.imap_host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let smtp_host = self
            .smtp_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(imap_host);

        let mut config = ServerConfig::standard(imap_host, smtp_host);
        config.imap.tls = self.imap_tls.unwrap_or(true);
        config.imap.port = self
            .imap_port
            .unwrap_or(if config.imap.tls { 993 } else { 143 });
        config.smtp.secure = self
            .smtp_secure
            .unwrap_or_else(|| self.smtp_port == Some(465));
        config.smtp.port = self
            .smtp_port
            .unwrap_or(if config.smtp.secure { 465 } else { 587 });
        Some(config)
    }
}

/// Incoming send payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub provider: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_html: bool,
    #[serde(flatten)]
    pub server: ServerOverride,
}

/// How the configuration used for a call was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInfo {
    pub source: DiscoverySource,
    pub imap_host: Option<String>,
    pub smtp_host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectSuccess {
    pub ok: bool,
    pub provider: String,
    pub emails: Vec<Email>,
    pub stats: EmailStats,
    pub discovery: DiscoveryInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSuccess {
    pub ok: bool,
    pub message_id: String,
    pub discovery: DiscoveryInfo,
}

/// Structured failure handed back instead of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub message: String,
    pub code: ErrorCode,
}

impl ErrorResponse {
    /// Response for a request body that does not deserialize
    pub fn invalid_request(err: &serde_json::Error) -> Self {
        Self::from(&ConnectivityError::Parse(format!("invalid request: {}", err)))
    }
}

impl From<&ConnectivityError> for ErrorResponse {
    fn from(err: &ConnectivityError) -> Self {
        let code = err.code();
        Self {
            ok: false,
            error: err.to_string(),
            message: code.hint().to_string(),
            code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectResponse {
    Success(ConnectSuccess),
    Failure(ErrorResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SendResponse {
    Success(SendSuccess),
    Failure(ErrorResponse),
}
