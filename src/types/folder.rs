use serde::{Deserialize, Serialize};

/// Logical folder names shared by the IMAP and Gmail paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalFolder {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Trash,
    Archive,
    Starred,
    /// A provider-native mailbox name used as-is
    Custom(String),
}

impl LogicalFolder {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" => Self::Drafts,
            "spam" | "junk" => Self::Spam,
            "trash" => Self::Trash,
            "archive" => Self::Archive,
            "starred" => Self::Starred,
            _ => Self::Custom(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Spam => "spam",
            Self::Trash => "trash",
            Self::Archive => "archive",
            Self::Starred => "starred",
            Self::Custom(name) => name,
        }
    }

    /// Mailbox names to try on an IMAP server, in priority order
    pub fn imap_aliases(&self) -> Vec<&str> {
        match self {
            Self::Inbox => vec!["INBOX"],
            Self::Sent => vec![
                "Sent",
                "SENT",
                "Sent Items",
                "Sent Messages",
                "Éléments envoyés",
                "Messages envoyés",
                "[Gmail]/Sent Mail",
            ],
            Self::Drafts => vec!["Drafts", "DRAFTS", "Brouillons", "[Gmail]/Drafts"],
            Self::Spam => vec![
                "Spam",
                "SPAM",
                "Junk",
                "Junk E-mail",
                "Junk Email",
                "Courrier indésirable",
                "[Gmail]/Spam",
            ],
            Self::Trash => vec![
                "Trash",
                "TRASH",
                "Deleted Items",
                "Deleted Messages",
                "Corbeille",
                "Éléments supprimés",
                "[Gmail]/Trash",
            ],
            Self::Archive => vec!["Archive", "ARCHIVE", "Archives", "[Gmail]/All Mail"],
            Self::Starred => vec!["[Gmail]/Starred", "Starred", "Flagged"],
            Self::Custom(name) => vec![name.as_str()],
        }
    }

    /// RFC 6154 SPECIAL-USE attribute marking this folder in a LIST response
    pub fn special_use(&self) -> Option<&'static str> {
        match self {
            Self::Sent => Some("\\Sent"),
            Self::Drafts => Some("\\Drafts"),
            Self::Spam => Some("\\Junk"),
            Self::Trash => Some("\\Trash"),
            Self::Archive => Some("\\Archive"),
            Self::Starred => Some("\\Flagged"),
            Self::Inbox | Self::Custom(_) => None,
        }
    }

    /// Gmail search query; anything without a mapping reads the inbox
    pub fn gmail_query(&self) -> &'static str {
        match self {
            Self::Starred => "is:starred",
            Self::Sent => "in:sent",
            Self::Drafts => "in:drafts",
            Self::Spam => "in:spam",
            Self::Trash => "in:trash",
            Self::Inbox | Self::Archive => "in:inbox",
            Self::Custom(_) => "in:inbox",
        }
    }
}

impl Default for LogicalFolder {
    fn default() -> Self {
        Self::Inbox
    }
}

impl From<String> for LogicalFolder {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LogicalFolder> for String {
    fn from(value: LogicalFolder) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for LogicalFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
