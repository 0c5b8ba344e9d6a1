//! DNS-based candidate inference
//!
//! Maps MX exchanges onto known hosting templates and falls back to
//! hostname heuristics. Every emitted candidate's IMAP host has been
//! checked to resolve.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info};

use super::{providers, KnownProvider, ServerConfig};

/// A single MX record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    /// Lowercase exchange hostname without trailing dot
    pub exchange: String,
}

/// DNS operations needed by discovery
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// MX records for a domain, in server order
    async fn mx(&self, domain: &str) -> Result<Vec<MxRecord>, String>;

    /// Whether a hostname has at least one A/AAAA record
    async fn resolves(&self, host: &str) -> bool;
}

/// Hickory-backed resolver
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for HickoryDns {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsLookup for HickoryDns {
    async fn mx(&self, domain: &str) -> Result<Vec<MxRecord>, String> {
        debug!("Querying MX records for {}", domain);

        let response = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| format!("MX lookup failed: {}", e))?;

        Ok(response
            .iter()
            .map(|r| MxRecord {
                preference: r.preference(),
                exchange: r
                    .exchange()
                    .to_string()
                    .trim_end_matches('.')
                    .to_lowercase(),
            })
            .collect())
    }

    async fn resolves(&self, host: &str) -> bool {
        // Fully qualify so the system search list is not appended
        let fqdn = format!("{}.", host.trim_end_matches('.'));
        match self.resolver.lookup_ip(fqdn.as_str()).await {
            Ok(ips) => ips.iter().next().is_some(),
            Err(e) => {
                debug!("{} does not resolve: {}", host, e);
                false
            }
        }
    }
}

/// A prioritized probe candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub config: ServerConfig,
    /// Hosting provider the candidate was mapped from, if any
    pub provider: Option<&'static str>,
}

/// Known hosting templates keyed by MX hostname fragments
const MX_TEMPLATES: &[(&[&str], fn() -> KnownProvider)] = &[
    (&["google.com", "googlemail.com"], providers::google),
    (
        &["protection.outlook.com", "outlook.com", "microsoft.com", "office365.com"],
        providers::microsoft_365,
    ),
    (&["zoho.eu"], zoho_eu),
    (&["zoho.com", "zoho.in"], providers::zoho),
    (&["titan.email"], titan),
    (&["ovh.net", "ovh.com"], ovh),
    (&["ionos", "1and1", "kundenserver.de", "perfora.net"], ionos),
    (&["gandi.net"], gandi),
    (&["hostinger"], hostinger),
    (&["privateemail.com"], private_email),
    (&["infomaniak"], infomaniak),
    (&["yandex.net", "yandex.ru"], providers::yandex),
    (&["secureserver.net", "godaddy"], godaddy),
];

fn zoho_eu() -> KnownProvider {
    KnownProvider {
        name: "Zoho Mail",
        config: ServerConfig::standard("imap.zoho.eu", "smtp.zoho.eu").with_smtps(),
    }
}

fn titan() -> KnownProvider {
    KnownProvider {
        name: "Titan",
        config: ServerConfig::standard("imap.titan.email", "smtp.titan.email").with_smtps(),
    }
}

fn ovh() -> KnownProvider {
    KnownProvider {
        name: "OVHcloud",
        config: ServerConfig::standard("ssl0.ovh.net", "ssl0.ovh.net").with_smtps(),
    }
}

fn ionos() -> KnownProvider {
    KnownProvider {
        name: "IONOS",
        config: ServerConfig::standard("imap.ionos.com", "smtp.ionos.com"),
    }
}

fn gandi() -> KnownProvider {
    KnownProvider {
        name: "Gandi",
        config: ServerConfig::standard("mail.gandi.net", "mail.gandi.net").with_smtps(),
    }
}

fn hostinger() -> KnownProvider {
    KnownProvider {
        name: "Hostinger",
        config: ServerConfig::standard("imap.hostinger.com", "smtp.hostinger.com").with_smtps(),
    }
}

fn private_email() -> KnownProvider {
    KnownProvider {
        name: "PrivateEmail",
        config: ServerConfig::standard("mail.privateemail.com", "mail.privateemail.com")
            .with_smtps(),
    }
}

fn infomaniak() -> KnownProvider {
    KnownProvider {
        name: "Infomaniak",
        config: ServerConfig::standard("mail.infomaniak.com", "mail.infomaniak.com").with_smtps(),
    }
}

fn godaddy() -> KnownProvider {
    KnownProvider {
        name: "GoDaddy",
        config: ServerConfig::standard("imap.secureserver.net", "smtpout.secureserver.net")
            .with_smtps(),
    }
}

/// Map an MX exchange hostname onto a known hosting template
pub fn template_for_mx(exchange: &str) -> Option<KnownProvider> {
    let exchange = exchange.to_lowercase();
    MX_TEMPLATES
        .iter()
        .find(|(fragments, _)| fragments.iter().any(|f| exchange.contains(f)))
        .map(|(_, template)| template())
}

/// Strip leading `mx*` / `mail` labels from an MX hostname
///
/// `mx1.mailhost.example.net` becomes `mailhost.example.net`. At least two
/// labels are always kept.
pub fn mx_root(exchange: &str) -> String {
    let mut labels: Vec<&str> = exchange.trim_end_matches('.').split('.').collect();
    while labels.len() > 2 && (labels[0].starts_with("mx") || labels[0] == "mail") {
        labels.remove(0);
    }
    labels.join(".")
}

/// Bare guesses used when MX data is unavailable: `mail.`, `imap.`, the domain
pub fn bare_guesses(domain: &str) -> Vec<String> {
    vec![
        format!("mail.{}", domain),
        format!("imap.{}", domain),
        domain.to_string(),
    ]
}

/// Builds the ordered candidate list for an unknown domain
pub struct DnsInference<'a, D: DnsLookup + ?Sized> {
    dns: &'a D,
    max_candidates: usize,
}

impl<'a, D: DnsLookup + ?Sized> DnsInference<'a, D> {
    pub fn new(dns: &'a D, max_candidates: usize) -> Self {
        Self {
            dns,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Ordered, de-duplicated candidates. Never fails; an empty list means
    /// nothing resolvable was found.
    pub async fn infer_candidates(&self, domain: &str) -> Vec<Candidate> {
        let mut records = match self.dns.mx(domain).await {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => {
                debug!("No MX records for {}", domain);
                return self.fallback_candidates(domain).await;
            }
            Err(e) => {
                debug!("{}", e);
                return self.fallback_candidates(domain).await;
            }
        };
        records.sort_by_key(|r| r.preference);

        let mut candidates: Vec<Candidate> = Vec::new();

        for record in &records {
            let Some(template) = template_for_mx(&record.exchange) else {
                continue;
            };
            if candidates.iter().any(|c| c.config == template.config) {
                continue;
            }
            if self.dns.resolves(&template.config.imap.host).await {
                info!(
                    "MX {} maps to {} ({})",
                    record.exchange, template.name, template.config.imap.host
                );
                candidates.push(Candidate {
                    config: template.config,
                    provider: Some(template.name),
                });
                if candidates.len() >= self.max_candidates {
                    break;
                }
            } else {
                debug!(
                    "Template host {} for MX {} does not resolve",
                    template.config.imap.host, record.exchange
                );
            }
        }

        if candidates.is_empty() {
            if let Some(host) = self.first_resolving(&heuristic_hosts(domain, &records)).await {
                info!("Heuristic IMAP host for {}: {}", domain, host);
                candidates.push(Candidate {
                    config: ServerConfig::standard(&host, &host),
                    provider: None,
                });
            }
        }

        candidates.truncate(self.max_candidates);
        candidates
    }

    /// Bare guesses gated by DNS resolution
    pub async fn fallback_candidates(&self, domain: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for host in bare_guesses(domain) {
            if self.dns.resolves(&host).await {
                candidates.push(Candidate {
                    config: ServerConfig::standard(&host, &host),
                    provider: None,
                });
            }
        }
        candidates
    }

    async fn first_resolving(&self, hosts: &[String]) -> Option<String> {
        for host in hosts {
            if self.dns.resolves(host).await {
                return Some(host.clone());
            }
        }
        None
    }
}

/// `imap.<domain>`, `mail.<domain>`, then `imap.`/`mail.` on each MX root
fn heuristic_hosts(domain: &str, records: &[MxRecord]) -> Vec<String> {
    let mut hosts = vec![format!("imap.{}", domain), format!("mail.{}", domain)];
    for record in records {
        let root = mx_root(&record.exchange);
        for host in [format!("imap.{}", root), format!("mail.{}", root)] {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
    }
    hosts
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory DNS used by discovery tests
    #[derive(Default)]
    pub struct FakeDns {
        pub mx: HashMap<String, Vec<MxRecord>>,
        pub hosts: HashSet<String>,
        pub mx_calls: Mutex<Vec<String>>,
        pub resolve_calls: Mutex<Vec<String>>,
    }

    impl FakeDns {
        pub fn with_mx(mut self, domain: &str, records: &[(u16, &str)]) -> Self {
            self.mx.insert(
                domain.to_string(),
                records
                    .iter()
                    .map(|(preference, exchange)| MxRecord {
                        preference: *preference,
                        exchange: exchange.to_string(),
                    })
                    .collect(),
            );
            self
        }

        pub fn with_hosts(mut self, hosts: &[&str]) -> Self {
            self.hosts.extend(hosts.iter().map(|h| h.to_string()));
            self
        }

        pub fn mx_call_count(&self) -> usize {
            self.mx_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DnsLookup for FakeDns {
        async fn mx(&self, domain: &str) -> Result<Vec<MxRecord>, String> {
            self.mx_calls.lock().unwrap().push(domain.to_string());
            self.mx
                .get(domain)
                .cloned()
                .ok_or_else(|| format!("NXDOMAIN {}", domain))
        }

        async fn resolves(&self, host: &str) -> bool {
            self.resolve_calls.lock().unwrap().push(host.to_string());
            self.hosts.contains(host)
        }
    }
}
