//! Gmail REST retrieval for OAuth accounts

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapters::MailFetcher;
use crate::config::EngineConfig;
use crate::error::{ConnectivityError, Result};
use crate::mime::{decode_base64_body, normalize, MessageHeaders, MimePart};
use crate::types::{Email, FetchOutcome, LogicalFolder};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    internal_date: Option<String>,
    payload: Option<GmailPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct GmailBody {
    #[serde(default)]
    size: usize,
    data: Option<String>,
}

impl GmailPart {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    }

    fn to_mime(&self) -> MimePart {
        let mime_type = self.mime_type.to_lowercase();
        let filename = Some(self.filename.trim().to_string()).filter(|f| !f.is_empty());
        let disposition = self.header("Content-Disposition").and_then(|value| {
            value
                .split(';')
                .next()
                .map(|kind| kind.trim().to_lowercase())
                .filter(|kind| !kind.is_empty())
        });
        let data = self.body.as_ref().and_then(|b| b.data.as_deref());

        let text = if self.parts.is_empty() && mime_type.starts_with("text/") && filename.is_none() {
            match data.map(decode_base64_body) {
                Some(Some(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Some(None) => {
                    debug!(mime_type = %mime_type, "Skipping undecodable Gmail part");
                    None
                }
                None => None,
            }
        } else {
            None
        };

        MimePart {
            mime_type,
            filename,
            content_id: self.header("Content-ID"),
            disposition,
            text,
            size: self.body.as_ref().map(|b| b.size).unwrap_or(0),
            parts: self.parts.iter().map(GmailPart::to_mime).collect(),
        }
    }
}

impl GmailMessage {
    fn into_email(self, text_as_html: bool) -> Result<Email> {
        let payload = self
            .payload
            .ok_or_else(|| ConnectivityError::Parse(format!("message {} has no payload", self.id)))?;
        let headers = MessageHeaders::from_values(
            payload.header("Subject"),
            payload.header("From"),
            payload.header("Date"),
            payload.header("Message-ID"),
        );
        let content = normalize(&payload.to_mime(), text_as_html);
        let unread = self.label_ids.iter().any(|label| label == "UNREAD");
        let received = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|dt| dt.to_rfc3339());

        Ok(Email::new(self.id, headers, content, unread, received))
    }
}

/// OAuth-path retrieval through the Gmail REST API
pub struct GmailFetcher {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
    text_as_html: bool,
}

impl GmailFetcher {
    pub fn new(access_token: impl Into<String>, config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            api_base: config.gmail.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            text_as_html: config.fetch.text_as_html,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConnectivityError::Gmail {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }
        Ok(response.json().await?)
    }

    async fn get_message(&self, id: &str) -> Result<Email> {
        let url = format!("{}/messages/{}", self.api_base, id);
        let message: GmailMessage = self
            .get_json(&url, &[("format", "full".to_string())])
            .await?;
        message.into_email(self.text_as_html)
    }
}

#[async_trait]
impl MailFetcher for GmailFetcher {
    fn provider(&self) -> &str {
        "gmail"
    }

    async fn fetch(&self, folder: &LogicalFolder, limit: usize) -> Result<FetchOutcome> {
        let query = folder.gmail_query();
        info!(folder = %folder, query, limit, "Listing Gmail messages");

        let url = format!("{}/messages", self.api_base);
        let list: ListMessagesResponse = self
            .get_json(
                &url,
                &[("q", query.to_string()), ("maxResults", limit.to_string())],
            )
            .await?;

        let mut outcome = FetchOutcome::default();
        for item in list.messages.iter().take(limit) {
            match self.get_message(&item.id).await {
                Ok(email) => outcome.emails.push(email),
                Err(e) => {
                    warn!(message_id = %item.id, "Skipping Gmail message: {}", e);
                    outcome.skipped += 1;
                }
            }
        }

        debug!(
            fetched = outcome.emails.len(),
            skipped = outcome.skipped,
            "Gmail fetch complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FULL_MESSAGE: &str = r#"{
        "id": "18c0ffee",
        "labelIds": ["INBOX", "UNREAD"],
        "internalDate": "1735725600000",
        "payload": {
            "mimeType": "multipart/mixed",
            "headers": [
                {"name": "From", "value": "Carol Doe <carol@example.org>"},
                {"name": "Subject", "value": "Quarterly numbers"}
            ],
            "parts": [
                {
                    "mimeType": "multipart/alternative",
                    "parts": [
                        {"mimeType": "text/plain", "body": {"size": 11, "data": "UGxhaW4gaGVsbG8"}},
                        {"mimeType": "text/html", "body": {"size": 24, "data": "PHA-SGVsbG8gPGI-R21haWw8L2I-PC9wPg"}}
                    ]
                },
                {
                    "mimeType": "image/png",
                    "filename": "chart.png",
                    "headers": [{"name": "Content-ID", "value": "<chart1>"}],
                    "body": {"size": 2048, "attachmentId": "ANGjdJ"}
                }
            ]
        }
    }"#;

    #[test]
    fn test_full_payload_to_email() {
        let message: GmailMessage = serde_json::from_str(FULL_MESSAGE).unwrap();
        let email = message.into_email(false).unwrap();

        assert_eq!(email.id, "18c0ffee");
        assert!(email.unread());
        assert_eq!(email.subject, "Quarterly numbers");
        assert_eq!(email.from_name, "Carol Doe");
        assert_eq!(email.body, "<p>Hello <b>Gmail</b></p>");
        assert_eq!(email.snippet, "Hello Gmail");
        assert_eq!(email.date, "2025-01-01T10:00:00+00:00");
        assert!(email.has_attachments());
        let chart = &email.attachments()[0];
        assert_eq!(chart.filename, "chart.png");
        assert_eq!(chart.content_id.as_deref(), Some("chart1"));
        assert_eq!(chart.size, 2048);
    }

    #[test]
    fn test_malformed_part_is_skipped() {
        let message: GmailMessage = serde_json::from_str(
            r#"{
                "id": "a1",
                "labelIds": ["INBOX"],
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [{"name": "Subject", "value": "Broken html"}],
                    "parts": [
                        {"mimeType": "text/html", "body": {"size": 3, "data": "***"}},
                        {"mimeType": "text/plain", "body": {"size": 5, "data": "aGVsbG8="}}
                    ]
                }
            }"#,
        )
        .unwrap();

        let email = message.into_email(false).unwrap();
        assert!(!email.unread());
        assert_eq!(email.body, "hello");
        assert_eq!(email.date, "");
    }

    #[test]
    fn test_missing_payload_errors() {
        let message: GmailMessage = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(message.into_email(false).is_err());
    }

    /// Serves canned responses keyed by request path prefix
    async fn serve(routes: Vec<(&'static str, u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .iter()
                    .find(|(prefix, _, _)| path.starts_with(prefix))
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, "{}".to_string()));
                let response = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    fn fetcher(base: String) -> GmailFetcher {
        let mut config = EngineConfig::default();
        config.gmail.api_base = base;
        GmailFetcher::new("token", &config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_skips_failed_messages() {
        let base = serve(vec![
            (
                "/messages?",
                200,
                r#"{"messages":[{"id":"18c0ffee"},{"id":"gone"}]}"#.to_string(),
            ),
            ("/messages/18c0ffee", 200, FULL_MESSAGE.to_string()),
            ("/messages/gone", 404, r#"{"error":"not found"}"#.to_string()),
        ])
        .await;

        let outcome = fetcher(base)
            .fetch(&LogicalFolder::Inbox, 20)
            .await
            .unwrap();

        assert_eq!(outcome.emails.len(), 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.emails[0].id, "18c0ffee");
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_auth_error() {
        let base = serve(vec![("/messages", 401, r#"{"error":"invalid"}"#.to_string())]).await;

        let err = fetcher(base)
            .fetch(&LogicalFolder::Sent, 5)
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::error::ErrorCode::AuthFailed);
    }
}
