pub mod connection;
pub mod fetch;
pub mod folders;

pub use fetch::ImapMailFetcher;
