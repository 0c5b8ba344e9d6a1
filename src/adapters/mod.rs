pub mod gmail;
pub mod imap;
pub mod smtp;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FetchOutcome, LogicalFolder};

/// A retrieval strategy producing canonical emails
///
/// Implementations own no connection between calls; each `fetch` opens and
/// tears down its own transport.
#[async_trait]
pub trait MailFetcher: Send + Sync {
    /// Provider label reported in stats
    fn provider(&self) -> &str;

    /// Fetch the newest `limit` messages of `folder`, newest first
    async fn fetch(&self, folder: &LogicalFolder, limit: usize) -> Result<FetchOutcome>;
}
