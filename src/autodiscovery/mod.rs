//! Mail server endpoint discovery
//!
//! Turns an email address into a validated [`ServerConfig`] using, in order
//! of trust:
//! - a static registry of well-known providers
//! - MX record analysis mapped onto known hosting templates
//! - heuristic hostname guesses
//!
//! Anything that is not static knowledge must pass a live IMAP login before
//! it is handed out.

mod dns;
mod probe;
mod providers;
mod resolver;

pub use dns::*;
pub use probe::*;
pub use providers::*;
pub use resolver::*;

#[cfg(test)]
pub(crate) use dns::testing;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConnectivityError;

/// IMAP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImapEndpoint {
    pub host: String,
    pub port: u16,
    /// `true` for implicit TLS, `false` for a STARTTLS upgrade
    pub tls: bool,
}

/// SMTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    /// `true` for implicit TLS (465), `false` for STARTTLS
    pub secure: bool,
}

/// Resolved IMAP + SMTP coordinates for one account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerConfig {
    pub imap: ImapEndpoint,
    pub smtp: SmtpEndpoint,
}

impl ServerConfig {
    /// Conventional ports for a host serving both protocols
    pub fn standard(imap_host: &str, smtp_host: &str) -> Self {
        Self {
            imap: ImapEndpoint {
                host: imap_host.to_string(),
                port: 993,
                tls: true,
            },
            smtp: SmtpEndpoint {
                host: smtp_host.to_string(),
                port: 587,
                secure: false,
            },
        }
    }

    /// Implicit-TLS submission variant (SMTP on 465)
    pub fn with_smtps(mut self) -> Self {
        self.smtp.port = 465;
        self.smtp.secure = true;
        self
    }
}

/// Account credentials, held only for the duration of a call
#[derive(Clone)]
pub enum Credentials {
    /// Password or app password
    Password { user: String, password: String },
    /// OAuth2 bearer token
    OAuth2 { user: String, access_token: String },
}

impl Credentials {
    pub fn user(&self) -> &str {
        match self {
            Self::Password { user, .. } | Self::OAuth2 { user, .. } => user,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::OAuth2 { user, .. } => f
                .debug_struct("OAuth2")
                .field("user", user)
                .field("access_token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Where a resolved configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Caller-supplied override
    Forced,
    /// Static provider registry
    Registry,
    /// MX analysis
    Mx,
    /// Bare hostname guesses
    Fallback,
    /// OAuth path, no host discovery
    Oauth,
}

/// A resolved configuration together with how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub config: ServerConfig,
    /// Provider display name, when known
    pub provider: Option<String>,
    pub source: DiscoverySource,
}

/// Split an address into a lowercase domain, validating its shape
pub fn email_domain(email: &str) -> Result<String, ConnectivityError> {
    let email = email.trim().to_lowercase();
    match email.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(domain.trim_end_matches('.').to_string())
        }
        _ => Err(ConnectivityError::InvalidEmail(email)),
    }
}
