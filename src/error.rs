//! Error types for the connectivity engine
//!
//! Internal failures carry as much detail as the protocol layer gives us.
//! Before anything is handed back to a caller it is collapsed onto the fixed
//! [`ErrorCode`] taxonomy, partly from the variant and partly from the message
//! text, because IMAP and SMTP servers report most problems as free-form text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingEmail,
    MissingPassword,
    AuthFailed,
    ConnectionFailed,
    ConfigNotFound,
    ImapError,
}

impl ErrorCode {
    /// Short machine-friendly label, also used as the `error` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingEmail => "MISSING_EMAIL",
            Self::MissingPassword => "MISSING_PASSWORD",
            Self::AuthFailed => "AUTH_FAILED",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::ImapError => "IMAP_ERROR",
        }
    }

    /// Human-readable explanation shown next to the raw error
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MissingEmail => "An email address is required.",
            Self::MissingPassword => "A password or app password is required for this account.",
            Self::AuthFailed => {
                "The server rejected the credentials. Check the password, or use an app password if the provider requires one."
            }
            Self::ConnectionFailed => {
                "Could not reach the mail server. Check the host, port and your network connectivity."
            }
            Self::ConfigNotFound => {
                "Could not determine the mail server for this address. Enter the IMAP/SMTP settings manually."
            }
            Self::ImapError => "The mail server returned an unexpected error.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("No email address supplied")]
    MissingEmail,

    #[error("No password supplied")]
    MissingPassword,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("No working mail server configuration found for domain: {0}")]
    ConfigNotFound(String),

    #[error("Known provider {provider} is unreachable: {host} does not resolve")]
    ProviderUnreachable { provider: String, host: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Gmail API returned {status}: {message}")]
    Gmail { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const AUTH_PATTERNS: &[&str] = &[
    "authentication failed",
    "authenticationfailed",
    "invalid credentials",
    "login failed",
    "invalid login",
    "auth failed",
    "username and password not accepted",
    "incorrect password",
    "535",
    "[auth]",
];

const CONNECTION_PATTERNS: &[&str] = &[
    "enotfound",
    "econnrefused",
    "etimedout",
    "connection refused",
    "timed out",
    "timeout",
    "no such host",
    "failed to lookup",
    "dns",
    "network is unreachable",
    "host unreachable",
    "connection reset",
    "does not resolve",
];

impl ConnectivityError {
    /// Classify this error into the user-facing taxonomy
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingEmail | Self::InvalidEmail(_) => ErrorCode::MissingEmail,
            Self::MissingPassword => ErrorCode::MissingPassword,
            Self::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            Self::Auth(_) => ErrorCode::AuthFailed,
            Self::ProviderUnreachable { .. } | Self::Connection(_) | Self::Tls(_) => {
                ErrorCode::ConnectionFailed
            }
            Self::Gmail { status: 401 | 403, .. } => ErrorCode::AuthFailed,
            Self::Http(e) if e.is_connect() || e.is_timeout() => ErrorCode::ConnectionFailed,
            Self::Http(e) if matches!(e.status().map(|s| s.as_u16()), Some(401 | 403)) => {
                ErrorCode::AuthFailed
            }
            other => classify_message(&other.to_string()),
        }
    }
}

/// Pattern-match a free-form protocol error message onto the taxonomy
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorCode::AuthFailed
    } else if CONNECTION_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorCode::ConnectionFailed
    } else {
        ErrorCode::ImapError
    }
}

/// Result type alias using ConnectivityError
pub type Result<T> = std::result::Result<T, ConnectivityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_variants() {
        assert_eq!(ConnectivityError::MissingEmail.code(), ErrorCode::MissingEmail);
        assert_eq!(
            ConnectivityError::MissingPassword.code(),
            ErrorCode::MissingPassword
        );
        assert_eq!(
            ConnectivityError::ConfigNotFound("example.org".into()).code(),
            ErrorCode::ConfigNotFound
        );
        assert_eq!(
            ConnectivityError::ProviderUnreachable {
                provider: "Gmail".into(),
                host: "imap.gmail.com".into()
            }
            .code(),
            ErrorCode::ConnectionFailed
        );
    }

    #[test]
    fn test_message_patterns() {
        let err = ConnectivityError::Imap("NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)".into());
        assert_eq!(err.code(), ErrorCode::AuthFailed);

        let err = ConnectivityError::Imap("LOGIN failed.".into());
        assert_eq!(err.code(), ErrorCode::AuthFailed);

        let err = ConnectivityError::Smtp("Connection refused (os error 111)".into());
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);

        let err = ConnectivityError::Imap("BAD command unknown".into());
        assert_eq!(err.code(), ErrorCode::ImapError);
    }

    #[test]
    fn test_gmail_status() {
        let err = ConnectivityError::Gmail {
            status: 401,
            message: "Request had invalid authentication credentials".into(),
        };
        assert_eq!(err.code(), ErrorCode::AuthFailed);

        let err = ConnectivityError::Gmail {
            status: 500,
            message: "Backend Error".into(),
        };
        assert_eq!(err.code(), ErrorCode::ImapError);
    }

    #[test]
    fn test_serialized_code() {
        let json = serde_json::to_string(&ErrorCode::ConfigNotFound).unwrap();
        assert_eq!(json, "\"CONFIG_NOT_FOUND\"");
        assert_eq!(ErrorCode::AuthFailed.as_str(), "AUTH_FAILED");
    }
}
