//! Live, time-bounded validation of a candidate configuration
//!
//! A probe is a full IMAP connect + login. A server that answered and then
//! refused the credentials is reported apart from one that never answered.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::{Credentials, ServerConfig};
use crate::adapters::imap::connection;
use crate::error::{ConnectivityError, ErrorCode};

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passed,
    /// The server completed the handshake and rejected the login
    AuthRejected(String),
    Unreachable,
}

/// Checks whether a configuration accepts the given credentials
#[async_trait]
pub trait ConfigProber: Send + Sync {
    async fn probe(
        &self,
        config: &ServerConfig,
        credentials: &Credentials,
        limit: Duration,
    ) -> ProbeOutcome;
}

/// Probes by opening and immediately closing an IMAP session
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapProber;

#[async_trait]
impl ConfigProber for ImapProber {
    async fn probe(
        &self,
        config: &ServerConfig,
        credentials: &Credentials,
        limit: Duration,
    ) -> ProbeOutcome {
        let endpoint = &config.imap;
        debug!("Probing IMAP server {}:{}", endpoint.host, endpoint.port);

        // On timeout the connect future is dropped, which closes the socket.
        match timeout(limit, connection::open_session(endpoint, credentials)).await {
            Ok(Ok(session)) => {
                let _ = timeout(limit, connection::close(session)).await;
                debug!("Probe succeeded for {}:{}", endpoint.host, endpoint.port);
                ProbeOutcome::Passed
            }
            Ok(Err(e)) if e.code() == ErrorCode::AuthFailed => {
                debug!("Login rejected by {}:{}: {}", endpoint.host, endpoint.port, e);
                let reason = match e {
                    ConnectivityError::Auth(message) => message,
                    other => other.to_string(),
                };
                ProbeOutcome::AuthRejected(reason)
            }
            Ok(Err(e)) => {
                debug!("Probe failed for {}:{}: {}", endpoint.host, endpoint.port, e);
                ProbeOutcome::Unreachable
            }
            Err(_) => {
                debug!(
                    "Probe timed out for {}:{} after {:?}",
                    endpoint.host, endpoint.port, limit
                );
                ProbeOutcome::Unreachable
            }
        }
    }
}
