//! Resolution pipeline: forced override > registry > MX inference > bare guesses
//!
//! Each tier is only consulted when the previous one produced nothing. Static
//! knowledge is trusted without a probe; everything inferred must log in.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    email_domain, providers, Candidate, ConfigProber, ProbeOutcome, Credentials, Discovery, DiscoverySource,
    DnsInference, DnsLookup, ProviderHint, ServerConfig,
};
use crate::config::EngineConfig;
use crate::error::{ConnectivityError, Result};

/// Turns an address + credentials into a validated configuration
pub struct ConnectionResolver<'a> {
    dns: &'a dyn DnsLookup,
    prober: &'a dyn ConfigProber,
    probe_timeout: Duration,
    max_candidates: usize,
    concurrency: usize,
}

impl<'a> ConnectionResolver<'a> {
    pub fn new(dns: &'a dyn DnsLookup, prober: &'a dyn ConfigProber, config: &EngineConfig) -> Self {
        Self {
            dns,
            prober,
            probe_timeout: config.probe.timeout(),
            max_candidates: config.discovery.max_candidates,
            concurrency: config.probe.concurrency.max(1),
        }
    }

    /// Override the per-probe timeout
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub async fn resolve(
        &self,
        email: &str,
        credentials: &Credentials,
        forced: Option<ServerConfig>,
        hint: Option<ProviderHint>,
    ) -> Result<Discovery> {
        if let Some(config) = forced {
            info!("Using caller-supplied server configuration");
            return Ok(Discovery {
                config,
                provider: None,
                source: DiscoverySource::Forced,
            });
        }

        let domain = email_domain(email)?;
        info!("Resolving mail servers for domain: {}", domain);

        // Step 1: static registry, or the provider named by the caller
        let known = providers::lookup(&domain).or_else(|| hint.and_then(|h| h.provider()));
        if let Some(known) = known {
            if self.dns.resolves(&known.config.imap.host).await {
                info!("Known provider {} for {}", known.name, domain);
                return Ok(Discovery {
                    config: known.config,
                    provider: Some(known.name.to_string()),
                    source: DiscoverySource::Registry,
                });
            }
            warn!(
                "Known provider {} host {} does not resolve",
                known.name, known.config.imap.host
            );
            return Err(ConnectivityError::ProviderUnreachable {
                provider: known.name.to_string(),
                host: known.config.imap.host,
            });
        }

        let inference = DnsInference::new(self.dns, self.max_candidates);
        let mut attempted = HashSet::new();
        let mut rejected = None;

        // Step 2: MX-derived candidates
        let candidates = inference.infer_candidates(&domain).await;
        debug!("{} MX-derived candidate(s) for {}", candidates.len(), domain);
        if let Some(winner) = self
            .first_passing(candidates, credentials, &mut attempted, &mut rejected)
            .await {
            return Ok(discovery(winner, DiscoverySource::Mx));
        }

        // Step 3: bare guesses not already tried
        let guesses = inference.fallback_candidates(&domain).await;
        if let Some(winner) = self
            .first_passing(guesses, credentials, &mut attempted, &mut rejected)
            .await {
            return Ok(discovery(winner, DiscoverySource::Fallback));
        }

        // A server that answered and refused the login means the host was right
        if let Some((host, reason)) = rejected {
            warn!("All candidates failed for {}; {} rejected the login", domain, host);
            return Err(ConnectivityError::Auth(format!("{}: {}", host, reason)));
        }

        warn!("Exhausted all candidates for {}", domain);
        Err(ConnectivityError::ConfigNotFound(domain))
    }

    /// Probe candidates in priority order and return the first that logs in
    ///
    /// With `concurrency > 1` up to that many probes run at once; results are
    /// still consumed in priority order and returning drops (cancels) any
    /// attempt still in flight. The first login rejection seen is kept in
    /// `rejected` as `(host, reason)`.
    async fn first_passing(
        &self,
        candidates: Vec<Candidate>,
        credentials: &Credentials,
        attempted: &mut HashSet<ServerConfig>,
        rejected: &mut Option<(String, String)>,
    ) -> Option<Candidate> {
        let fresh: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| attempted.insert(c.config.clone()))
            .collect();

        if self.concurrency <= 1 {
            for candidate in fresh {
                let outcome = self
                    .prober
                    .probe(&candidate.config, credentials, self.probe_timeout)
                    .await;
                if let Some(winner) = settle(candidate, outcome, rejected) {
                    return Some(winner);
                }
            }
            return None;
        }

        let mut results = stream::iter(fresh)
            .map(|candidate| async move {
                let outcome = self
                    .prober
                    .probe(&candidate.config, credentials, self.probe_timeout)
                    .await;
                (candidate, outcome)
            })
            .buffered(self.concurrency);

        while let Some((candidate, outcome)) = results.next().await {
            if let Some(winner) = settle(candidate, outcome, rejected) {
                return Some(winner);
            }
        }
        None
    }
}

fn settle(
    candidate: Candidate,
    outcome: ProbeOutcome,
    rejected: &mut Option<(String, String)>,
) -> Option<Candidate> {
    match outcome {
        ProbeOutcome::Passed => {
            info!("Candidate {} passed", candidate.config.imap.host);
            Some(candidate)
        }
        ProbeOutcome::AuthRejected(reason) => {
            if rejected.is_none() {
                *rejected = Some((candidate.config.imap.host, reason));
            }
            None
        }
        ProbeOutcome::Unreachable => None,
    }
}

fn discovery(candidate: Candidate, source: DiscoverySource) -> Discovery {
    Discovery {
        config: candidate.config,
        provider: candidate.provider.map(str::to_string),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiscovery::dns::testing::FakeDns;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Prober that accepts a fixed set of IMAP hosts
    #[derive(Default)]
    struct FakeProber {
        accept: HashSet<String>,
        reject_login: HashSet<String>,
        calls: Mutex<Vec<String>>,
        delay: Option<(String, Duration)>,
    }

    impl FakeProber {
        fn accepting(hosts: &[&str]) -> Self {
            Self {
                accept: hosts.iter().map(|h| h.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConfigProber for FakeProber {
        async fn probe(&self, config: &ServerConfig, _: &Credentials, _: Duration) -> ProbeOutcome {
            self.calls.lock().unwrap().push(config.imap.host.clone());
            if let Some((host, delay)) = &self.delay {
                if host == &config.imap.host {
                    tokio::time::sleep(*delay).await;
                }
            }
            if self.accept.contains(&config.imap.host) {
                ProbeOutcome::Passed
            } else if self.reject_login.contains(&config.imap.host) {
                ProbeOutcome::AuthRejected("Invalid credentials".to_string())
            } else {
                ProbeOutcome::Unreachable
            }
        }
    }

    fn credentials() -> Credentials {
        Credentials::Password {
            user: "alice@example.org".into(),
            password: "secret".into(),
        }
    }

    fn engine_config(concurrency: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.probe.concurrency = concurrency;
        config
    }

    #[tokio::test]
    async fn test_registry_hit_skips_discovery_and_probing() {
        let dns = FakeDns::default().with_hosts(&["imap.gmail.com"]);
        let prober = FakeProber::default();
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let found = resolver
            .resolve("email@gmail.com", &credentials(), None, None)
            .await
            .unwrap();

        assert_eq!(found.source, DiscoverySource::Registry);
        assert_eq!(found.config, ServerConfig::standard("imap.gmail.com", "smtp.gmail.com"));
        assert_eq!(dns.mx_call_count(), 0);
        assert!(prober.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_registry_host_fails_fast() {
        let dns = FakeDns::default().with_hosts(&["imap.example.org"]);
        let prober = FakeProber::accepting(&["imap.example.org"]);
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let err = resolver
            .resolve("email@gmail.com", &credentials(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectivityError::ProviderUnreachable { .. }));
        assert_eq!(dns.mx_call_count(), 0);
        assert!(prober.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forced_config_is_used_unconditionally() {
        let dns = FakeDns::default();
        let prober = FakeProber::default();
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));
        let forced = ServerConfig::standard("imap.internal.example", "smtp.internal.example");

        let found = resolver
            .resolve("alice@example.org", &credentials(), Some(forced.clone()), None)
            .await
            .unwrap();

        assert_eq!(found.config, forced);
        assert_eq!(found.source, DiscoverySource::Forced);
        assert!(dns.resolve_calls.lock().unwrap().is_empty());
        assert!(prober.calls().is_empty());
    }

    #[tokio::test]
    async fn test_office365_mx_wins_without_heuristics() {
        let dns = FakeDns::default()
            .with_mx("contoso.example", &[(0, "contoso-example.mail.protection.outlook.com")])
            .with_hosts(&["outlook.office365.com", "mail.contoso.example"]);
        let prober = FakeProber::accepting(&["outlook.office365.com", "mail.contoso.example"]);
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let found = resolver
            .resolve("bob@contoso.example", &credentials(), None, None)
            .await
            .unwrap();

        assert_eq!(found.source, DiscoverySource::Mx);
        assert_eq!(found.config.imap.host, "outlook.office365.com");
        assert_eq!(found.config.smtp.host, "smtp.office365.com");
        assert_eq!(found.provider.as_deref(), Some("Microsoft 365"));
        assert_eq!(prober.calls(), vec!["outlook.office365.com"]);
        assert!(!dns
            .resolve_calls
            .lock()
            .unwrap()
            .contains(&"mail.contoso.example".to_string()));
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_success() {
        let dns = FakeDns::default()
            .with_mx(
                "example.org",
                &[(1, "aspmx.l.google.com"), (2, "mx.zoho.com"), (3, "mx1.titan.email")],
            )
            .with_hosts(&["imap.gmail.com", "imap.zoho.com", "imap.titan.email"]);
        let prober = FakeProber::accepting(&["imap.zoho.com", "imap.titan.email"]);
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let found = resolver
            .resolve("alice@example.org", &credentials(), None, None)
            .await
            .unwrap();

        assert_eq!(found.config.imap.host, "imap.zoho.com");
        assert_eq!(prober.calls(), vec!["imap.gmail.com", "imap.zoho.com"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_bare_guesses() {
        let dns = FakeDns::default()
            .with_mx("example.org", &[(10, "mx1.titan.email")])
            .with_hosts(&["imap.titan.email", "mail.example.org", "example.org"]);
        let prober = FakeProber::accepting(&["example.org"]);
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let found = resolver
            .resolve("alice@example.org", &credentials(), None, None)
            .await
            .unwrap();

        assert_eq!(found.source, DiscoverySource::Fallback);
        assert_eq!(found.config.imap.host, "example.org");
        assert_eq!(
            prober.calls(),
            vec!["imap.titan.email", "mail.example.org", "example.org"]
        );
        assert!(dns.hosts.contains(&found.config.imap.host));
    }

    #[tokio::test]
    async fn test_bare_guesses_are_not_probed_twice() {
        // No MX: inference already returns the bare guesses
        let dns = FakeDns::default().with_hosts(&["mail.example.org"]);
        let prober = FakeProber::default();
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let err = resolver
            .resolve("alice@example.org", &credentials(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectivityError::ConfigNotFound(ref d) if d == "example.org"));
        assert_eq!(prober.calls(), vec!["mail.example.org"]);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_config_not_found() {
        let dns = FakeDns::default();
        let prober = FakeProber::default();
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let err = resolver
            .resolve("alice@nowhere.example", &credentials(), None, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::error::ErrorCode::ConfigNotFound);
        assert!(prober.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_hint_for_custom_domain() {
        let dns = FakeDns::default().with_hosts(&["imap.gmail.com"]);
        let prober = FakeProber::default();
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let found = resolver
            .resolve("alice@example.org", &credentials(), None, Some(ProviderHint::Gmail))
            .await
            .unwrap();

        assert_eq!(found.config.imap.host, "imap.gmail.com");
        assert_eq!(dns.mx_call_count(), 0);
    }

    #[tokio::test]
    async fn test_parallel_probing_keeps_priority_order() {
        let dns = FakeDns::default()
            .with_mx(
                "example.org",
                &[(1, "aspmx.l.google.com"), (2, "mx.zoho.com"), (3, "mx1.titan.email")],
            )
            .with_hosts(&["imap.gmail.com", "imap.zoho.com", "imap.titan.email"]);
        let prober = FakeProber {
            accept: ["imap.zoho.com", "imap.titan.email"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            delay: Some(("imap.zoho.com".to_string(), Duration::from_millis(50))),
            ..Default::default()
        };
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(3));

        let found = resolver
            .resolve("alice@example.org", &credentials(), None, None)
            .await
            .unwrap();

        assert_eq!(found.config.imap.host, "imap.zoho.com");
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_failure() {
        let dns = FakeDns::default()
            .with_mx("example.org", &[(10, "mx1.titan.email")])
            .with_hosts(&["imap.titan.email", "mail.example.org"]);
        let prober = FakeProber {
            reject_login: ["imap.titan.email".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let resolver = ConnectionResolver::new(&dns, &prober, &engine_config(1));

        let err = resolver
            .resolve("alice@example.org", &credentials(), None, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::error::ErrorCode::AuthFailed);
        assert!(err.to_string().contains("imap.titan.email"));
        assert_eq!(prober.calls(), vec!["imap.titan.email", "mail.example.org"]);
    }
}
