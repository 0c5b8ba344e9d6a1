//! Message normalization
//!
//! Both retrieval paths reduce a message to a [`MimePart`] tree first: IMAP
//! through `mailparse`, Gmail by decoding its JSON payload. Everything after
//! that (body selection, attachment metadata, snippets) is shared.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{TimeZone, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConnectivityError, Result};
use crate::types::Attachment;

pub const SNIPPET_LEN: usize = 200;

/// One node of a MIME tree, with transfer encoding already undone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimePart {
    /// Lowercase `type/subtype`
    pub mime_type: String,
    pub filename: Option<String>,
    /// Raw `Content-ID` header value
    pub content_id: Option<String>,
    /// Lowercase disposition type (`inline`, `attachment`)
    pub disposition: Option<String>,
    /// Decoded content, only for text leaves
    pub text: Option<String>,
    /// Decoded size in bytes
    pub size: usize,
    pub parts: Vec<MimePart>,
}

impl MimePart {
    /// Parse a raw RFC 5322 message
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw)
            .map_err(|e| ConnectivityError::Parse(format!("MIME parse failed: {}", e)))?;
        Ok(Self::from_parsed(&parsed))
    }

    pub fn from_parsed(mail: &ParsedMail<'_>) -> Self {
        let mime_type = mail.ctype.mimetype.to_lowercase();
        let disposition = mail.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| mail.ctype.params.get("name"))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let disposition_type = match disposition.disposition {
            mailparse::DispositionType::Inline => Some("inline".to_string()),
            mailparse::DispositionType::Attachment => Some("attachment".to_string()),
            _ => None,
        };

        let is_leaf = mail.subparts.is_empty();
        let size = if is_leaf {
            mail.get_body_raw().map(|b| b.len()).unwrap_or(0)
        } else {
            0
        };
        // A body that fails to decode is treated as absent
        let text = if is_leaf && mime_type.starts_with("text/") && filename.is_none() {
            mail.get_body().ok()
        } else {
            None
        };

        Self {
            mime_type,
            filename,
            content_id: mail.headers.get_first_value("Content-ID"),
            disposition: disposition_type,
            text,
            size,
            parts: mail.subparts.iter().map(Self::from_parsed).collect(),
        }
    }

    fn is_attachment(&self) -> bool {
        if self.filename.is_some() {
            return true;
        }
        if !self.parts.is_empty() || self.mime_type.starts_with("multipart/") {
            return false;
        }
        if self.disposition.as_deref() == Some("attachment") {
            return true;
        }
        !self.mime_type.starts_with("text/") && self.content_id.is_some()
    }
}

/// Preferred body representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyContent {
    Html(String),
    Text(String),
    Empty,
}

impl BodyContent {
    pub fn html(&self) -> Option<&str> {
        match self {
            Self::Html(html) => Some(html),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Plain display derivative, whitespace collapsed and truncated
    ///
    /// Only HTML bodies have tags stripped; plain text keeps `<addr>` runs.
    pub fn snippet(&self) -> String {
        match self {
            Self::Html(html) => snippet(html),
            Self::Text(text) => text_snippet(text),
            Self::Empty => String::new(),
        }
    }

    /// `html ?? text ?? ""`
    pub fn into_body(self) -> String {
        match self {
            Self::Html(value) | Self::Text(value) => value,
            Self::Empty => String::new(),
        }
    }
}

/// Result of walking a message tree
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub body: BodyContent,
    pub attachments: Vec<Attachment>,
}

impl NormalizedMessage {
    /// Attachment addressed by a `cid:` reference, brackets optional
    pub fn inline_attachment(&self, cid: &str) -> Option<&Attachment> {
        let key = strip_angle_brackets(cid.trim_start_matches("cid:"));
        self.attachments
            .iter()
            .find(|a| a.content_id.as_deref() == Some(key))
    }
}

#[derive(Default)]
struct Walk {
    html: Option<String>,
    text: Option<String>,
    attachments: Vec<Attachment>,
}

/// Walk a MIME tree depth-first and pick body + attachments
///
/// HTML wins over plain text; plain text is rendered as HTML when
/// `text_as_html` is set.
pub fn normalize(root: &MimePart, text_as_html: bool) -> NormalizedMessage {
    let mut walk = Walk::default();
    visit(root, &mut walk);

    let body = match (walk.html, walk.text) {
        (Some(html), _) => BodyContent::Html(html),
        (None, Some(text)) if text_as_html => BodyContent::Html(text_to_html(&text)),
        (None, Some(text)) => BodyContent::Text(text),
        (None, None) => BodyContent::Empty,
    };

    NormalizedMessage {
        body,
        attachments: walk.attachments,
    }
}

fn visit(part: &MimePart, walk: &mut Walk) {
    if part.is_attachment() {
        let content_id = part
            .content_id
            .as_deref()
            .map(strip_angle_brackets)
            .filter(|cid| !cid.is_empty())
            .map(str::to_string);
        let filename = part
            .filename
            .clone()
            .or_else(|| content_id.clone())
            .unwrap_or_else(|| "attachment".to_string());
        walk.attachments.push(Attachment {
            filename,
            mime_type: part.mime_type.clone(),
            size: part.size,
            content_id,
        });
        return;
    }

    match (part.mime_type.as_str(), &part.text) {
        ("text/html", Some(html)) if walk.html.is_none() => walk.html = Some(html.clone()),
        ("text/plain", Some(text)) if walk.text.is_none() => walk.text = Some(text.clone()),
        _ => {}
    }

    for child in &part.parts {
        visit(child, walk);
    }
}

pub fn strip_angle_brackets(value: &str) -> &str {
    value.trim().trim_start_matches('<').trim_end_matches('>').trim()
}

/// Decode a base64 / base64url body, padded or not
pub fn decode_base64_body(data: &str) -> Option<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    URL_SAFE_NO_PAD
        .decode(compact.as_bytes())
        .or_else(|_| URL_SAFE.decode(compact.as_bytes()))
        .or_else(|_| STANDARD.decode(compact.as_bytes()))
        .ok()
}

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(style|script|head)\b[^>]*>.*?</(style|script|head)\s*>")
        .expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid regex"));

/// Strip tags, decode common entities, collapse whitespace, cap at 200 chars
pub fn snippet(content: &str) -> String {
    plain_text(content).chars().take(SNIPPET_LEN).collect()
}

/// Collapse whitespace in plain text and cap at 200 chars
pub fn text_snippet(text: &str) -> String {
    SPACE_RE
        .replace_all(text, " ")
        .trim()
        .chars()
        .take(SNIPPET_LEN)
        .collect()
}

/// Tag-stripped, whitespace-collapsed rendering of HTML
pub fn plain_text(html: &str) -> String {
    let without_blocks = BLOCK_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    SPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render plain text as HTML with clickable links
pub fn text_to_html(text: &str) -> String {
    let escaped = escape_html(&text.replace("\r\n", "\n"));
    let linked = URL_RE.replace_all(&escaped, r#"<a href="$0">$0</a>"#);
    let paragraphs: Vec<String> = linked
        .split("\n\n")
        .map(|block| block.trim().replace('\n', "<br/>"))
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", block))
        .collect();
    paragraphs.join("")
}

/// Header fields parsed on the fast path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub subject: String,
    /// Raw `From` text
    pub from: String,
    /// Display name, or the address when there is none
    pub from_name: String,
    /// RFC 3339, empty when unknown
    pub date: String,
    pub message_id: Option<String>,
}

impl MessageHeaders {
    /// Parse a raw header block (RFC 2047 words decoded)
    pub fn from_header_block(raw: &[u8]) -> Result<Self> {
        let (headers, _) = mailparse::parse_headers(raw)
            .map_err(|e| ConnectivityError::Parse(format!("header parse failed: {}", e)))?;
        Ok(Self::from_values(
            headers.get_first_value("Subject"),
            headers.get_first_value("From"),
            headers.get_first_value("Date"),
            headers.get_first_value("Message-ID"),
        ))
    }

    /// Build from already-decoded header values
    pub fn from_values(
        subject: Option<String>,
        from: Option<String>,
        date: Option<String>,
        message_id: Option<String>,
    ) -> Self {
        let from = from.unwrap_or_default().trim().to_string();
        Self {
            subject: subject.unwrap_or_default().trim().to_string(),
            from_name: display_name(&from),
            from,
            date: date.as_deref().map(rfc3339_date).unwrap_or_default(),
            message_id: message_id
                .map(|id| strip_angle_brackets(&id).to_string())
                .filter(|id| !id.is_empty()),
        }
    }
}

/// Best-effort display name for a `From` value
pub fn display_name(from: &str) -> String {
    if let Ok(list) = mailparse::addrparse(from) {
        if let Some(mailparse::MailAddr::Single(info)) = list.iter().next() {
            return info
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| info.addr.clone());
        }
    }
    from.trim_matches('"').to_string()
}

/// Convert an RFC 5322 date to RFC 3339 UTC, empty when unparseable
pub fn rfc3339_date(value: &str) -> String {
    mailparse::dateparse(value)
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Alice Example <alice@example.org>\r\n\
Subject: Hello\r\n\
Date: Tue, 1 Jul 2025 10:00:00 +0200\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hi Bob, see https://example.org/x for details.\r\n";

    const INLINE_IMAGE: &str = "From: news@example.org\r\n\
Subject: Logo\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"rel\"\r\n\
\r\n\
--rel\r\n\
Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain version\r\n\
--alt\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><head><style>p{color:red}</style></head><body><p>Hello <b>there</b></p><img src=\"cid:logo1\"></body></html>\r\n\
--alt--\r\n\
--rel\r\n\
Content-Type: image/png; name=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <logo1>\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--rel--\r\n";

    const WITH_ATTACHMENT: &str = "From: a@example.org\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"mix\"\r\n\
\r\n\
--mix\r\n\
Content-Type: text/plain\r\n\
\r\n\
See attached.\r\n\
--mix\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--mix--\r\n";

    #[test]
    fn test_plain_text_only() {
        let tree = MimePart::from_raw(PLAIN.as_bytes()).unwrap();
        let normalized = normalize(&tree, false);

        assert_eq!(normalized.body.html(), None);
        let text = normalized.body.text().unwrap();
        assert!(text.starts_with("Hi Bob"));
        assert!(normalized.attachments.is_empty());
        assert_eq!(normalized.body.snippet(), text.trim());
        assert_eq!(normalized.body.clone().into_body(), text);
    }

    #[test]
    fn test_plain_text_rendered_as_html() {
        let tree = MimePart::from_raw(PLAIN.as_bytes()).unwrap();
        let normalized = normalize(&tree, true);

        let html = normalized.body.html().unwrap();
        assert!(html.contains(r#"<a href="https://example.org/x">https://example.org/x</a>"#));
        assert!(normalized.body.snippet().starts_with("Hi Bob, see https://example.org/x"));
    }

    #[test]
    fn test_html_preferred_and_inline_cid() {
        let tree = MimePart::from_raw(INLINE_IMAGE.as_bytes()).unwrap();
        let normalized = normalize(&tree, false);

        let html = normalized.body.html().unwrap();
        assert!(html.contains("cid:logo1"));
        assert_eq!(normalized.attachments.len(), 1);

        let logo = normalized.inline_attachment("cid:logo1").unwrap();
        assert_eq!(logo.content_id.as_deref(), Some("logo1"));
        assert_eq!(logo.filename, "logo.png");
        assert_eq!(logo.mime_type, "image/png");
        assert_eq!(normalized.body.snippet(), "Hello there");
    }

    #[test]
    fn test_attachment_metadata() {
        let tree = MimePart::from_raw(WITH_ATTACHMENT.as_bytes()).unwrap();
        let normalized = normalize(&tree, false);

        assert_eq!(normalized.body.text().map(str::trim), Some("See attached."));
        assert_eq!(normalized.attachments.len(), 1);
        let pdf = &normalized.attachments[0];
        assert_eq!(pdf.filename, "report.pdf");
        assert_eq!(pdf.mime_type, "application/pdf");
        assert_eq!(pdf.size, 9);
        assert_eq!(pdf.content_id, None);
    }

    #[test]
    fn test_empty_message() {
        let tree = MimePart {
            mime_type: "multipart/mixed".into(),
            ..Default::default()
        };
        let normalized = normalize(&tree, false);
        assert_eq!(normalized.body, BodyContent::Empty);
        assert_eq!(normalized.body.into_body(), "");
    }

    #[test]
    fn test_plain_text_snippet_keeps_bracketed_address() {
        let normalized = normalize(
            &MimePart {
                mime_type: "text/plain".into(),
                text: Some("On Mon, Bob <bob@example.org> wrote:\r\nline two".into()),
                ..Default::default()
            },
            false,
        );

        assert_eq!(
            normalized.body.snippet(),
            "On Mon, Bob <bob@example.org> wrote: line two"
        );
        assert_eq!(text_snippet(&"x".repeat(300)).len(), SNIPPET_LEN);
    }

    #[test]
    fn test_text_part_with_attachment_disposition() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body text\r\n\
--b\r\n\
Content-Type: text/csv\r\n\
Content-Disposition: attachment\r\n\
\r\n\
a,b\r\n\
--b--\r\n";
        let tree = MimePart::from_raw(raw.as_bytes()).unwrap();
        let normalized = normalize(&tree, false);

        assert_eq!(normalized.body.text().map(str::trim), Some("Body text"));
        assert_eq!(normalized.attachments.len(), 1);
        assert_eq!(normalized.attachments[0].mime_type, "text/csv");
        assert_eq!(normalized.attachments[0].filename, "attachment");
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(500);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_LEN);
        assert_eq!(snippet("<p>a&amp;b</p>\n\n  c"), "a&b c");
    }

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64_body("aGk_Pz8").unwrap(), b"hi???");
        assert_eq!(decode_base64_body("aGk_Pz8=").unwrap(), b"hi???");
        assert_eq!(decode_base64_body("aGk/Pz8=").unwrap(), b"hi???");
        assert!(decode_base64_body("***").is_none());
    }

    #[test]
    fn test_headers_fast_path() {
        let headers = MessageHeaders::from_header_block(
            b"From: =?UTF-8?Q?Ren=C3=A9?= <rene@example.org>\r\nSubject: =?UTF-8?B?SGVsbG8=?=\r\nDate: Tue, 1 Jul 2025 10:00:00 +0200\r\nMessage-ID: <abc@example.org>\r\n\r\n",
        )
        .unwrap();

        assert_eq!(headers.subject, "Hello");
        assert_eq!(headers.from_name, "René");
        assert_eq!(headers.date, "2025-07-01T08:00:00+00:00");
        assert_eq!(headers.message_id.as_deref(), Some("abc@example.org"));
    }

    #[test]
    fn test_display_name_falls_back_to_address() {
        assert_eq!(display_name("bob@example.org"), "bob@example.org");
        assert_eq!(display_name("\"Bob B\" <bob@example.org>"), "Bob B");
    }
}
