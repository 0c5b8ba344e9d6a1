use async_imap::types::{Fetch, Flag};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::connection::{self, map_imap_error, ImapSession};
use super::folders;
use crate::adapters::MailFetcher;
use crate::autodiscovery::{Credentials, ServerConfig};
use crate::error::{ConnectivityError, Result};
use crate::mime::{normalize, MessageHeaders, MimePart};
use crate::types::{Email, FetchOutcome, LogicalFolder};

const FETCH_QUERY: &str =
    "(UID FLAGS INTERNALDATE BODY.PEEK[HEADER.FIELDS (FROM TO SUBJECT DATE MESSAGE-ID)] BODY.PEEK[])";

/// Password-path retrieval over IMAP
pub struct ImapMailFetcher {
    config: ServerConfig,
    credentials: Credentials,
    provider: String,
    text_as_html: bool,
}

impl ImapMailFetcher {
    pub fn new(
        config: ServerConfig,
        credentials: Credentials,
        provider: impl Into<String>,
        text_as_html: bool,
    ) -> Self {
        Self {
            config,
            credentials,
            provider: provider.into(),
            text_as_html,
        }
    }
}

#[async_trait]
impl MailFetcher for ImapMailFetcher {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn fetch(&self, folder: &LogicalFolder, limit: usize) -> Result<FetchOutcome> {
        let mut session = connection::open_session(&self.config.imap, &self.credentials).await?;
        let result = fetch_window(&mut session, folder, limit, self.text_as_html).await;
        connection::close(session).await;
        result
    }
}

/// Sequence range covering the newest `limit` of `total` messages
pub fn window(total: u32, limit: usize) -> Option<(u32, u32)> {
    if total == 0 || limit == 0 {
        return None;
    }
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    let start = total.saturating_sub(limit).saturating_add(1).max(1);
    Some((start, total))
}

async fn fetch_window(
    session: &mut ImapSession,
    folder: &LogicalFolder,
    limit: usize,
    text_as_html: bool,
) -> Result<FetchOutcome> {
    let Some(mailbox) = folders::resolve_mailbox(session, folder).await? else {
        info!(folder = %folder, "Folder not present on server");
        return Ok(FetchOutcome::default());
    };

    // EXAMINE keeps the mailbox read-only; BODY.PEEK leaves \Seen alone
    let status = session.examine(&mailbox).await.map_err(map_imap_error)?;
    let Some((start, end)) = window(status.exists, limit) else {
        debug!(mailbox = %mailbox, "Mailbox is empty");
        return Ok(FetchOutcome::default());
    };

    info!(mailbox = %mailbox, start, end, "Fetching message window");
    let range = format!("{}:{}", start, end);
    let stream = session
        .fetch(&range, FETCH_QUERY)
        .await
        .map_err(map_imap_error)?;
    let fetches = collect_tolerant(stream, &mailbox).await;

    let messages: Vec<RawMessage> = fetches.iter().map(RawMessage::from_fetch).collect();
    let expected = (end - start + 1) as usize;
    Ok(build_outcome(messages, expected, text_as_html))
}

async fn collect_tolerant<E: std::fmt::Display>(
    stream: impl futures::Stream<Item = std::result::Result<Fetch, E>>,
    mailbox: &str,
) -> Vec<Fetch> {
    futures::pin_mut!(stream);
    let mut items = Vec::new();
    while let Some(result) = stream.next().await {
        match result {
            Ok(fetch) => items.push(fetch),
            Err(e) => warn!(mailbox = %mailbox, "Skipping unparseable IMAP response: {}", e),
        }
    }
    items
}

/// The parts of a FETCH response needed to build an [`Email`]
#[derive(Debug, Clone, Default)]
struct RawMessage {
    seq: u32,
    uid: Option<u32>,
    header: Option<Vec<u8>>,
    body: Option<Vec<u8>>,
    seen: bool,
    internal_date: Option<String>,
}

impl RawMessage {
    fn from_fetch(fetch: &Fetch) -> Self {
        Self {
            seq: fetch.message,
            uid: fetch.uid,
            header: fetch.header().map(<[u8]>::to_vec),
            body: fetch.body().map(<[u8]>::to_vec),
            seen: fetch.flags().any(|flag| matches!(flag, Flag::Seen)),
            internal_date: fetch
                .internal_date()
                .map(|date| date.with_timezone(&Utc).to_rfc3339()),
        }
    }

    fn into_email(self, text_as_html: bool) -> Result<Email> {
        let raw = self
            .body
            .ok_or_else(|| ConnectivityError::Parse(format!("message {} has no body", self.seq)))?;
        let headers = MessageHeaders::from_header_block(self.header.as_deref().unwrap_or(&raw[..]))?;
        let tree = MimePart::from_raw(&raw)?;
        let id = self.uid.unwrap_or(self.seq).to_string();
        Ok(Email::new(
            id,
            headers,
            normalize(&tree, text_as_html),
            !self.seen,
            self.internal_date,
        ))
    }
}

/// Convert a window of messages, newest first, dropping the ones that fail
fn build_outcome(mut messages: Vec<RawMessage>, expected: usize, text_as_html: bool) -> FetchOutcome {
    messages.sort_by(|a, b| b.seq.cmp(&a.seq));

    let mut emails = Vec::with_capacity(messages.len());
    for message in messages {
        let seq = message.seq;
        match message.into_email(text_as_html) {
            Ok(email) => emails.push(email),
            Err(e) => warn!(seq, "Skipping message: {}", e),
        }
    }

    let skipped = expected.saturating_sub(emails.len());
    if skipped > 0 {
        info!(skipped, "Some messages could not be read");
    }
    FetchOutcome { emails, skipped }
}
