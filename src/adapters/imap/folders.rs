use async_imap::types::{Name, NameAttribute};
use futures::TryStreamExt;
use tracing::debug;

use super::connection::{map_imap_error, ImapSession};
use crate::error::Result;
use crate::types::LogicalFolder;

/// A mailbox as listed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxName {
    /// Name on the wire (modified UTF-7), used for EXAMINE
    pub raw: String,
    /// Human-readable name, used for alias matching
    pub decoded: String,
    /// Hierarchy delimiter
    pub delimiter: Option<String>,
    /// SPECIAL-USE attribute, e.g. `\Sent`
    pub special_use: Option<String>,
}

impl MailboxName {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            decoded: utf7_imap::decode_utf7_imap(raw.to_string()),
            delimiter: None,
            special_use: None,
        }
    }

    fn from_name(name: &Name) -> Self {
        let special_use = name.attributes().iter().find_map(|attr| match attr {
            NameAttribute::Sent => Some("\\Sent"),
            NameAttribute::Drafts => Some("\\Drafts"),
            NameAttribute::Junk => Some("\\Junk"),
            NameAttribute::Trash => Some("\\Trash"),
            NameAttribute::Archive => Some("\\Archive"),
            NameAttribute::Flagged => Some("\\Flagged"),
            _ => None,
        });
        Self {
            delimiter: name.delimiter().map(str::to_string),
            special_use: special_use.map(str::to_string),
            ..Self::new(name.name())
        }
    }

    /// Last hierarchy segment: `INBOX.Sent` -> `Sent`
    fn leaf(&self) -> &str {
        let split = match self.delimiter.as_deref() {
            Some(delimiter) if !delimiter.is_empty() => self.decoded.rsplit(delimiter).next(),
            _ => self.decoded.rsplit(['/', '.']).next(),
        };
        split.unwrap_or(self.decoded.as_str())
    }
}

pub async fn list_mailboxes(session: &mut ImapSession) -> Result<Vec<MailboxName>> {
    let names: Vec<_> = session
        .list(Some(""), Some("*"))
        .await
        .map_err(map_imap_error)?
        .try_collect()
        .await
        .map_err(map_imap_error)?;

    let mailboxes: Vec<MailboxName> = names.iter().map(MailboxName::from_name).collect();
    debug!("Listed {} IMAP mailboxes", mailboxes.len());
    Ok(mailboxes)
}

/// Pick the server mailbox for a logical folder
///
/// Exact alias match first, in alias order; then the SPECIAL-USE attribute;
/// then an alias matching the last hierarchy segment (`INBOX.Sent`).
pub fn pick_mailbox<'a>(
    folder: &LogicalFolder,
    existing: &'a [MailboxName],
) -> Option<&'a MailboxName> {
    let aliases = folder.imap_aliases();
    let exact = aliases.iter().find_map(|alias| {
        existing.iter().find(|mailbox| {
            mailbox.decoded == *alias
                || (alias.eq_ignore_ascii_case("INBOX") && mailbox.raw.eq_ignore_ascii_case("INBOX"))
        })
    });
    if exact.is_some() {
        return exact;
    }

    if let Some(attr) = folder.special_use() {
        if let Some(mailbox) = existing
            .iter()
            .find(|m| m.special_use.as_deref() == Some(attr))
        {
            return Some(mailbox);
        }
    }

    aliases
        .iter()
        .find_map(|alias| existing.iter().find(|mailbox| mailbox.leaf() == *alias))
}

/// Map a logical folder onto a mailbox the server actually has
///
/// Returns `None` when no alias exists; INBOX always exists and needs no LIST.
pub async fn resolve_mailbox(
    session: &mut ImapSession,
    folder: &LogicalFolder,
) -> Result<Option<String>> {
    if *folder == LogicalFolder::Inbox {
        return Ok(Some("INBOX".to_string()));
    }

    let existing = list_mailboxes(session).await?;
    let picked = pick_mailbox(folder, &existing).map(|m| m.raw.clone());
    debug!(folder = %folder, mailbox = ?picked, "Resolved mailbox");
    Ok(picked)
}
