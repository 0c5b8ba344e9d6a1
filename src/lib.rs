//! Mail connectivity engine
//!
//! Given an email address and a credential, finds the account's mail servers,
//! fetches recent messages in one canonical shape and sends mail.
//!
//! ## Module Organization
//!
//! - `autodiscovery/`: provider registry, MX inference, probing, resolution
//! - `adapters/`: IMAP and Gmail retrieval strategies, SMTP sending
//! - `mime/`: MIME tree normalization shared by both retrieval paths
//! - `services/`: the facade callers talk to
//! - `types/`: canonical records and request/response shapes
//! - `config/`: engine configuration

pub mod adapters;
pub mod autodiscovery;
pub mod config;
pub mod error;
pub mod mime;
pub mod services;
pub mod tls;
pub mod types;

pub use error::{ConnectivityError, ErrorCode, Result};
pub use services::ConnectivityFacade;
pub use types::{ConnectRequest, ConnectResponse, SendRequest, SendResponse};

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber; stdout is reserved for responses
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("mail_connectivity=debug,info")
        } else {
            EnvFilter::new("mail_connectivity=info,warn")
        }
    });

    // A second call (tests, embedding hosts) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration and build a facade
///
/// An explicit path must load; the default lookup falls back to defaults.
pub fn init(config_path: Option<&Path>) -> Result<ConnectivityFacade> {
    tls::install_default_provider();
    match config_path {
        Some(path) => config::init_config_from_path(path)?,
        None => {
            if let Err(e) = config::init_config() {
                tracing::warn!("Could not load config, using defaults: {}", e);
            }
        }
    }
    Ok(ConnectivityFacade::new(config::get_config()))
}
