//! Connectivity facade
//!
//! Single entry point for callers. Picks the retrieval strategy (Gmail REST
//! for token-only requests, IMAP otherwise), runs discovery when needed and
//! turns every failure into a structured response.

use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::gmail::GmailFetcher;
use crate::adapters::imap::ImapMailFetcher;
use crate::adapters::smtp::{MailSender, OutgoingMail};
use crate::adapters::MailFetcher;
use crate::autodiscovery::{
    email_domain, google, provider_slug, ConfigProber, ConnectionResolver, Credentials, Discovery,
    DiscoverySource, DnsLookup, HickoryDns, ImapProber, ProviderHint,
};
use crate::config::EngineConfig;
use crate::error::{ConnectivityError, Result};
use crate::types::{
    ConnectRequest, ConnectResponse, ConnectSuccess, DiscoveryInfo, EmailStats, ErrorResponse,
    LogicalFolder, SendRequest, SendResponse, SendSuccess, ServerOverride,
};

pub struct ConnectivityFacade {
    config: EngineConfig,
    dns: Arc<dyn DnsLookup>,
    prober: Arc<dyn ConfigProber>,
    sender: MailSender,
}

/// Credentials as supplied by the caller, before dispatch
enum Auth {
    Password(String),
    TokenOnly(String),
}

impl ConnectivityFacade {
    /// Facade backed by the system resolver and live IMAP probes
    pub fn new(config: EngineConfig) -> Self {
        Self::with_components(config, Arc::new(HickoryDns::new()), Arc::new(ImapProber))
    }

    pub fn with_components(
        config: EngineConfig,
        dns: Arc<dyn DnsLookup>,
        prober: Arc<dyn ConfigProber>,
    ) -> Self {
        Self {
            config,
            dns,
            prober,
            sender: MailSender,
        }
    }

    pub async fn connect(&self, request: ConnectRequest) -> ConnectResponse {
        match self.try_connect(request).await {
            Ok(success) => ConnectResponse::Success(success),
            Err(e) => {
                warn!(code = e.code().as_str(), "Connect failed: {}", e);
                ConnectResponse::Failure(ErrorResponse::from(&e))
            }
        }
    }

    pub async fn send(&self, request: SendRequest) -> SendResponse {
        match self.try_send(request).await {
            Ok(success) => SendResponse::Success(success),
            Err(e) => {
                warn!(code = e.code().as_str(), "Send failed: {}", e);
                SendResponse::Failure(ErrorResponse::from(&e))
            }
        }
    }

    async fn try_connect(&self, request: ConnectRequest) -> Result<ConnectSuccess> {
        let email = required_email(request.email.as_deref())?;
        let auth = auth_from(request.password, request.access_token)?;
        let folder = LogicalFolder::parse(request.folder.as_deref().unwrap_or("INBOX"));
        let limit = self.config.fetch.effective_limit(request.limit);

        let (fetcher, discovery): (Box<dyn MailFetcher>, DiscoveryInfo) = match auth {
            Auth::TokenOnly(token) => {
                info!("Using Gmail API for token-only request");
                let fetcher: Box<dyn MailFetcher> = Box::new(GmailFetcher::new(token, &self.config)?);
                let info = DiscoveryInfo {
                    source: DiscoverySource::Oauth,
                    imap_host: None,
                    smtp_host: None,
                };
                (fetcher, info)
            }
            Auth::Password(password) => {
                let credentials = Credentials::Password {
                    user: email.clone(),
                    password,
                };
                let found = self
                    .discover(&email, &credentials, &request.server, request.provider.as_deref())
                    .await?;
                let provider = provider_label(&found, request.provider.as_deref());
                let info = discovery_info(&found);
                let fetcher: Box<dyn MailFetcher> = Box::new(ImapMailFetcher::new(
                    found.config,
                    credentials,
                    provider,
                    self.config.fetch.text_as_html,
                ));
                (fetcher, info)
            }
        };

        let outcome = fetcher.fetch(&folder, limit).await?;
        let provider = fetcher.provider().to_string();
        let stats = EmailStats::from_outcome(&outcome, &folder, &provider);
        info!(
            provider = %provider,
            total = stats.total,
            unread = stats.unread,
            skipped = stats.skipped,
            "Fetch complete"
        );

        Ok(ConnectSuccess {
            ok: true,
            provider,
            emails: outcome.emails,
            stats,
            discovery,
        })
    }

    async fn try_send(&self, request: SendRequest) -> Result<SendSuccess> {
        let email = required_email(request.email.as_deref())?;
        let auth = auth_from(request.password, request.access_token)?;

        let (credentials, found) = match auth {
            Auth::TokenOnly(access_token) => {
                let credentials = Credentials::OAuth2 {
                    user: email.clone(),
                    access_token,
                };
                let known = request
                    .provider
                    .as_deref()
                    .and_then(ProviderHint::parse)
                    .and_then(|hint| hint.provider())
                    .unwrap_or_else(google);
                let found = Discovery {
                    config: request.server.to_config().unwrap_or(known.config),
                    provider: Some(known.name.to_string()),
                    source: DiscoverySource::Oauth,
                };
                (credentials, found)
            }
            Auth::Password(password) => {
                let credentials = Credentials::Password {
                    user: email.clone(),
                    password,
                };
                let found = self
                    .discover(&email, &credentials, &request.server, request.provider.as_deref())
                    .await?;
                (credentials, found)
            }
        };

        let mail = OutgoingMail {
            to: request.to,
            subject: request.subject,
            content: request.content,
            is_html: request.is_html,
        };
        let message_id = self.sender.send(&found.config, &credentials, &mail).await?;
        info!(smtp_host = %found.config.smtp.host, "Message sent");

        Ok(SendSuccess {
            ok: true,
            message_id,
            discovery: discovery_info(&found),
        })
    }

    async fn discover(
        &self,
        email: &str,
        credentials: &Credentials,
        server: &ServerOverride,
        provider: Option<&str>,
    ) -> Result<Discovery> {
        let hint = provider.and_then(ProviderHint::parse);
        ConnectionResolver::new(self.dns.as_ref(), self.prober.as_ref(), &self.config)
            .resolve(email, credentials, server.to_config(), hint)
            .await
    }
}

fn required_email(email: Option<&str>) -> Result<String> {
    let email = email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or(ConnectivityError::MissingEmail)?;
    email_domain(email)?;
    Ok(email.to_string())
}

/// A password wins over a token; a token alone selects the OAuth path
fn auth_from(password: Option<String>, access_token: Option<String>) -> Result<Auth> {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    match (non_empty(password), non_empty(access_token)) {
        (Some(password), _) => Ok(Auth::Password(password)),
        (None, Some(token)) => Ok(Auth::TokenOnly(token)),
        (None, None) => Err(ConnectivityError::MissingPassword),
    }
}

/// Lowercase provider identifier, the same vocabulary as request hints
fn provider_label(found: &Discovery, hint: Option<&str>) -> String {
    found
        .provider
        .as_deref()
        .or(hint)
        .map(provider_slug)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| "imap".to_string())
}

fn discovery_info(found: &Discovery) -> DiscoveryInfo {
    DiscoveryInfo {
        source: found.source,
        imap_host: Some(found.config.imap.host.clone()),
        smtp_host: Some(found.config.smtp.host.clone()),
    }
}
