use async_imap::error::Error as ImapError;
use async_imap::{Authenticator, Client, Session};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::autodiscovery::{Credentials, ImapEndpoint};
use crate::error::{ConnectivityError, Result};
use crate::tls::{self, TlsStream};

// An IMAP session is generic over the stream type. Ours is always TLS over
// TCP, whether the TLS layer came first (993) or via STARTTLS (143).
pub type ImapSession = Session<TlsStream>;

/// Connect, upgrade to TLS and read the greeting
pub async fn connect(endpoint: &ImapEndpoint) -> Result<Client<TlsStream>> {
    debug!(
        imap_host = %endpoint.host,
        imap_port = endpoint.port,
        implicit_tls = endpoint.tls,
        "Connecting to IMAP server"
    );

    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            ConnectivityError::Connection(format!(
                "TCP connection to {}:{} failed: {}",
                endpoint.host, endpoint.port, e
            ))
        })?;

    let client = if endpoint.tls {
        let stream = tls::connect(&endpoint.host, tcp).await?;
        let mut client = Client::new(stream);
        read_greeting(&mut client).await?;
        client
    } else {
        let mut client = Client::new(tcp);
        read_greeting(&mut client).await?;
        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|e| ConnectivityError::Tls(format!("STARTTLS rejected: {}", e)))?;
        let tcp = client.into_inner();
        Client::new(tls::connect(&endpoint.host, tcp).await?)
    };

    Ok(client)
}

async fn read_greeting<S>(client: &mut Client<S>) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + std::fmt::Debug,
{
    client
        .read_response()
        .await
        .ok_or_else(|| ConnectivityError::Imap("IMAP server sent no greeting".to_string()))?
        .map_err(|e| ConnectivityError::Imap(format!("reading greeting failed: {}", e)))?;
    Ok(())
}

/// Authenticate with a password (LOGIN) or an OAuth2 token (XOAUTH2)
pub async fn login(client: Client<TlsStream>, credentials: &Credentials) -> Result<ImapSession> {
    let result = match credentials {
        Credentials::Password { user, password } => client.login(user, password).await,
        Credentials::OAuth2 { user, access_token } => {
            client
                .authenticate("XOAUTH2", XOAuth2 { user, access_token })
                .await
        }
    };

    result.map_err(|(err, _client)| match err {
        ImapError::No(message) | ImapError::Bad(message) => ConnectivityError::Auth(message),
        other => map_imap_error(other),
    })
}

/// Connect and log in
pub async fn open_session(
    endpoint: &ImapEndpoint,
    credentials: &Credentials,
) -> Result<ImapSession> {
    let client = connect(endpoint).await?;
    let session = login(client, credentials).await?;
    info!(imap_host = %endpoint.host, "IMAP session ready");
    Ok(session)
}

/// Log out; the socket is closed when the session drops either way
pub async fn close(mut session: ImapSession) {
    if let Err(e) = session.logout().await {
        warn!("IMAP logout failed: {}", e);
    }
}

pub fn map_imap_error(err: ImapError) -> ConnectivityError {
    match err {
        ImapError::Io(e) => ConnectivityError::Connection(e.to_string()),
        ImapError::ConnectionLost => {
            ConnectivityError::Connection("IMAP connection lost".to_string())
        }
        other => ConnectivityError::Imap(other.to_string()),
    }
}

/// SASL XOAUTH2 initial response
struct XOAuth2<'a> {
    user: &'a str,
    access_token: &'a str,
}

impl<'a> Authenticator for XOAuth2<'a> {
    type Response = String;

    fn process(&mut self, _: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}
