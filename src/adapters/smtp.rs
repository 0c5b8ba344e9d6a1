use chrono::Utc;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials as SmtpCredentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::autodiscovery::{Credentials, ServerConfig};
use crate::error::{classify_message, ConnectivityError, ErrorCode, Result};
use crate::mime::{plain_text, text_to_html};
use crate::tls;

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A message to submit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub content: String,
    pub is_html: bool,
}

/// Sends mail over a fresh SMTP transport per call; never retries
#[derive(Debug, Default, Clone, Copy)]
pub struct MailSender;

impl MailSender {
    /// Submit a message and return its Message-ID
    pub async fn send(
        &self,
        config: &ServerConfig,
        credentials: &Credentials,
        mail: &OutgoingMail,
    ) -> Result<String> {
        let (message, message_id) = build_message(credentials.user(), mail)?;
        let transport = build_transport(config, credentials)?;

        info!(
            smtp_host = %config.smtp.host,
            smtp_port = config.smtp.port,
            recipients = mail.to.len(),
            "Sending message"
        );
        transport.send(message).await.map_err(map_smtp_error)?;
        Ok(message_id)
    }
}

fn build_transport(
    config: &ServerConfig,
    credentials: &Credentials,
) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    tls::install_default_provider();
    let smtp = &config.smtp;
    let builder = if smtp.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
    }
    .map_err(|e| ConnectivityError::Smtp(e.to_string()))?
    .port(smtp.port);

    let builder = match credentials {
        Credentials::Password { user, password } => {
            builder.credentials(SmtpCredentials::new(user.clone(), password.clone()))
        }
        Credentials::OAuth2 { user, access_token } => builder
            .credentials(SmtpCredentials::new(user.clone(), access_token.clone()))
            .authentication(vec![Mechanism::Xoauth2]),
    };
    Ok(builder.build())
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| ConnectivityError::Smtp(format!("invalid address {:?}: {}", address, e)))
}

/// Build a text/HTML alternative message with a generated Message-ID
pub fn build_message(from: &str, mail: &OutgoingMail) -> Result<(Message, String)> {
    if mail.to.is_empty() {
        return Err(ConnectivityError::Smtp("no recipients".to_string()));
    }

    let from = parse_mailbox(from)?;
    let domain = from.email.domain().to_string();
    let message_id = format!(
        "{}.{}@{}",
        Utc::now().timestamp_micros(),
        MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed),
        domain
    );

    let mut builder = Message::builder()
        .from(from)
        .subject(mail.subject.clone())
        .message_id(Some(format!("<{}>", message_id)));
    for to in &mail.to {
        builder = builder.to(parse_mailbox(to)?);
    }

    let (text, html) = if mail.is_html {
        (plain_text(&mail.content), mail.content.clone())
    } else {
        (mail.content.clone(), text_to_html(&mail.content))
    };
    let body = MultiPart::alternative()
        .singlepart(SinglePart::plain(text))
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html),
        );

    let message = builder
        .multipart(body)
        .map_err(|e| ConnectivityError::Smtp(e.to_string()))?;
    Ok((message, message_id))
}

fn map_smtp_error(err: lettre::transport::smtp::Error) -> ConnectivityError {
    let message = err.to_string();
    if err.is_permanent() || err.is_transient() {
        match classify_message(&message) {
            ErrorCode::AuthFailed => ConnectivityError::Auth(message),
            _ => ConnectivityError::Smtp(message),
        }
    } else if err.is_client() {
        ConnectivityError::Smtp(message)
    } else {
        ConnectivityError::Connection(message)
    }
}
