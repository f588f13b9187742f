//! DNS resolution classification
//!
//! This module maps the outcome of a single A-record lookup into a closed,
//! stable taxonomy of seven classes:
//!
//! - `resolvable` - at least one A record came back
//! - `unresolvable` - NXDOMAIN or an empty answer; a positive "confirmed dead"
//! - `none` - seed state, not yet classified
//! - `nameServerError` - no working upstream responded
//! - `timeout` - the lifetime budget was exceeded after all retries
//! - `dnsError` - some other protocol-level DNS failure
//! - `error` - anything else that went wrong during the lookup
//!
//! The split matters operationally: `resolvable` and `unresolvable` are
//! treated as settled between runs, while the remaining classes are
//! provisional and get re-queried by the next refresh.
//!
//! Classification never fails. Every error path collapses into one of the
//! classes above, so callers can treat each `(class, domain)` pair as a
//! normal result and batch them without special-casing failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// Canonical outcome of a DNS lookup attempt.
///
/// The discriminants are stable ordinals; the on-disk representation uses the
/// camelCase names only (never the ordinals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResolutionClass {
    #[serde(rename = "resolvable")]
    Resolvable = 0,
    #[serde(rename = "unresolvable")]
    Unresolvable = 1,
    #[serde(rename = "none")]
    None = 2,
    #[serde(rename = "nameServerError")]
    NameServerError = 3,
    #[serde(rename = "timeout")]
    Timeout = 4,
    #[serde(rename = "dnsError")]
    DnsError = 5,
    #[serde(rename = "error")]
    Error = 6,
}

impl ResolutionClass {
    /// Every class, in ordinal order.
    pub const ALL: [ResolutionClass; 7] = [
        ResolutionClass::Resolvable,
        ResolutionClass::Unresolvable,
        ResolutionClass::None,
        ResolutionClass::NameServerError,
        ResolutionClass::Timeout,
        ResolutionClass::DnsError,
        ResolutionClass::Error,
    ];

    /// Classes that are re-queried on a cache refresh: everything except the
    /// settled `resolvable` and `unresolvable`.
    pub const PROVISIONAL: [ResolutionClass; 5] = [
        ResolutionClass::None,
        ResolutionClass::NameServerError,
        ResolutionClass::Timeout,
        ResolutionClass::DnsError,
        ResolutionClass::Error,
    ];

    /// The canonical name used on disk and in logs.
    pub fn name(self) -> &'static str {
        match self {
            ResolutionClass::Resolvable => "resolvable",
            ResolutionClass::Unresolvable => "unresolvable",
            ResolutionClass::None => "none",
            ResolutionClass::NameServerError => "nameServerError",
            ResolutionClass::Timeout => "timeout",
            ResolutionClass::DnsError => "dnsError",
            ResolutionClass::Error => "error",
        }
    }

    /// Stable ordinal of this class.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Looks a class up by its canonical name.
    pub fn from_name(name: &str) -> Option<ResolutionClass> {
        ResolutionClass::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for ResolutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classification result: the class a domain landed in.
pub type Classification = (ResolutionClass, String);

/// An ordered batch of classification results, as emitted by one chunk of a
/// worker.
pub type Batch = Vec<Classification>;

/// Upstream resolver configuration.
///
/// Defaults to Google's public nameservers with per-query rotation, a
/// 6-second lifetime budget and 3 retries, mirroring what a long bulk run
/// against a rate-limited upstream tolerates well.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Nameserver IPs queried over UDP/TCP on port 53.
    pub nameservers: Vec<IpAddr>,
    /// Rotate through the nameserver list instead of always asking the first.
    pub rotate: bool,
    /// Initial per-attempt lifetime budget.
    pub lifetime: Duration,
    /// Number of retries after a lifetime timeout before giving up.
    pub retries: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
            ],
            rotate: true,
            lifetime: Duration::from_secs(6),
            retries: 3,
        }
    }
}

/// A single DNS classification step.
///
/// The one seam the rest of the engine depends on: the batch processor and
/// executor only ever see this trait, so tests substitute deterministic
/// fakes and the production [`Classifier`] stays the only code that touches
/// the network.
#[async_trait]
pub trait Classify: Send + Sync {
    /// Classifies one domain. Never fails; every outcome is a class.
    async fn classify(&self, domain: &str) -> Classification;
}

/// Production classifier performing A-record lookups against the configured
/// upstreams.
///
/// Holds no mutable state across calls; the underlying resolver handle is
/// thread-safe and handles nameserver rotation internally, so one instance
/// is shared by every worker.
///
/// # Retry policy
///
/// Only lifetime timeouts are retried. On retry `k` (1-based) the classifier
/// sleeps `k` seconds and re-attempts with a budget of `lifetime * (k + 1)`.
/// Once `retries` attempts are exhausted the domain is classified `timeout`.
/// All other failures are terminal on the first attempt.
pub struct Classifier {
    resolver: TokioAsyncResolver,
    lifetime: Duration,
    retries: u32,
}

impl Classifier {
    /// Creates a classifier for the given upstream configuration.
    ///
    /// # Errors
    ///
    /// Fails when the nameserver list is empty; everything else about the
    /// resolver is infallible to construct.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        if config.nameservers.is_empty() {
            anyhow::bail!("at least one nameserver is required");
        }

        let group = NameServerConfigGroup::from_ips_clear(&config.nameservers, 53, true);
        let resolver_config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        // The growing per-attempt budget in classify() is the sole deadline;
        // the resolver's own timeout must never undercut it, so it is set to
        // the largest budget the schedule can reach.
        opts.timeout = config.lifetime * (config.retries + 1);
        opts.attempts = 1;
        opts.rotate = config.rotate;
        opts.use_hosts_file = false;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            lifetime: config.lifetime,
            retries: config.retries,
        })
    }
}

#[async_trait]
impl Classify for Classifier {
    async fn classify(&self, domain: &str) -> Classification {
        let resolver = &self.resolver;
        with_lifetime_retry(domain, self.lifetime, self.retries, || async move {
            match resolver.ipv4_lookup(domain).await {
                Ok(lookup) => {
                    if lookup.iter().next().is_some() {
                        debug!("{} resolved", domain);
                        AttemptOutcome::Settled(ResolutionClass::Resolvable)
                    } else {
                        debug!("{} returned an empty answer", domain);
                        AttemptOutcome::Settled(ResolutionClass::Unresolvable)
                    }
                }
                Err(err) => match err.kind() {
                    ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                        debug!("{}: {}", domain, err);
                        match *response_code {
                            ResponseCode::NXDomain | ResponseCode::NoError => {
                                AttemptOutcome::Settled(ResolutionClass::Unresolvable)
                            }
                            _ => AttemptOutcome::Settled(ResolutionClass::DnsError),
                        }
                    }
                    ResolveErrorKind::NoConnections => {
                        debug!("{}: no working nameservers", domain);
                        AttemptOutcome::Settled(ResolutionClass::NameServerError)
                    }
                    ResolveErrorKind::Timeout => {
                        debug!("{}: lifetime exceeded", domain);
                        AttemptOutcome::TimedOut
                    }
                    ResolveErrorKind::Proto(_)
                    | ResolveErrorKind::Message(_)
                    | ResolveErrorKind::Msg(_) => {
                        debug!("{}: {}", domain, err);
                        AttemptOutcome::Settled(ResolutionClass::DnsError)
                    }
                    _ => {
                        debug!("{}: {}", domain, err);
                        AttemptOutcome::Settled(ResolutionClass::Error)
                    }
                },
            }
        })
        .await
    }
}

/// What one lookup attempt produced: a terminal class, or a timeout that
/// the retry schedule may absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Settled(ResolutionClass),
    TimedOut,
}

/// Drives the lifetime-retry schedule around single lookup attempts.
///
/// Attempt `k` (0-based) runs under a deadline of `lifetime * (k + 1)`;
/// exceeding it counts as a timeout. After a timeout on attempt `k` the
/// driver sleeps `k + 1` seconds and tries again with the grown deadline,
/// until `retries` retries are spent and the domain settles as `timeout`.
/// A settled outcome returns immediately.
pub async fn with_lifetime_retry<F, Fut>(
    domain: &str,
    lifetime: Duration,
    retries: u32,
    attempt: F,
) -> Classification
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome>,
{
    let mut attempts: u32 = 0;

    loop {
        let budget = lifetime * (attempts + 1);

        let outcome = match timeout(budget, attempt()).await {
            Ok(outcome) => outcome,
            // Budget elapsed before the attempt finished on its own.
            Err(_) => {
                debug!("{}: lifetime budget of {:?} exceeded", domain, budget);
                AttemptOutcome::TimedOut
            }
        };

        match outcome {
            AttemptOutcome::Settled(class) => return (class, domain.to_owned()),
            AttemptOutcome::TimedOut => {
                if attempts == retries {
                    warn!("retries exhausted for domain {}", domain);
                    return (ResolutionClass::Timeout, domain.to_owned());
                }
                attempts += 1;
                sleep(Duration::from_secs(u64::from(attempts))).await;
            }
        }
    }
}
