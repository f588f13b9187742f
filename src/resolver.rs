//! Resolver facade
//!
//! [`DomainResolver`] is the single entry point over the whole engine:
//! it owns the classifier, the executor and the cache writer, and exposes
//! the two run shapes (`batch_resolve` over an explicit set,
//! `refresh_cache` over the provisional classes) plus intersection queries
//! against the cache.
//!
//! The facade is a process-wide singleton. The cache writer must stay
//! unique, so a second construction attempt fails fast instead of silently
//! creating a competing writer over the same snapshot file.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheStats, CacheWriter};
use crate::classify::{Classifier, Classify, ResolutionClass, UpstreamConfig};
use crate::executor::{default_max_workers, Executor};
use crate::paths;
use crate::processor::ProcessorOptions;

static FACADE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Classes whose members count as "still expected to resolve": confirmed
/// `resolvable`, plus the not-yet-settled `timeout` and `none`.
const RESOLVABLE_LEANING: [ResolutionClass; 3] = [
    ResolutionClass::Resolvable,
    ResolutionClass::Timeout,
    ResolutionClass::None,
];

/// The exact complement: confirmed dead plus the failure classes.
const UNRESOLVED_LEANING: [ResolutionClass; 4] = [
    ResolutionClass::Unresolvable,
    ResolutionClass::NameServerError,
    ResolutionClass::DnsError,
    ResolutionClass::Error,
];

/// Construction-time settings for the facade.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Upstream nameservers and retry policy.
    pub upstream: UpstreamConfig,
    /// Snapshot path; `None` resolves the configured default under the
    /// process root directory.
    pub cache_file: Option<PathBuf>,
    /// Minimum items per worker before another worker is added.
    pub min_worker_share: usize,
    /// Hard ceiling on the worker pool.
    pub max_workers: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            cache_file: None,
            min_worker_share: 100,
            max_workers: default_max_workers(),
        }
    }
}

/// Process-wide resolution engine handle.
pub struct DomainResolver {
    writer: Arc<CacheWriter>,
    executor: Executor,
    classifier: Arc<dyn Classify>,
}

impl std::fmt::Debug for DomainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainResolver").finish_non_exhaustive()
    }
}

impl DomainResolver {
    /// Builds the facade, loading any prior cache snapshot.
    ///
    /// # Errors
    ///
    /// Fails when an instance already exists in this process, or when the
    /// upstream configuration is unusable.
    pub async fn new(settings: ResolverSettings) -> Result<Self> {
        let classifier: Arc<dyn Classify> = Arc::new(Classifier::new(&settings.upstream)?);
        Self::with_classifier(settings, classifier).await
    }

    /// Builds the facade around an explicit classifier implementation.
    ///
    /// The classifier is the only networked component, so swapping it is
    /// how tests (or an offline dry-run) get a deterministic engine while
    /// keeping the cache and executor real.
    pub async fn with_classifier(
        settings: ResolverSettings,
        classifier: Arc<dyn Classify>,
    ) -> Result<Self> {
        if FACADE_CLAIMED.swap(true, Ordering::SeqCst) {
            bail!("DomainResolver is a singleton; an instance already exists in this process");
        }

        let cache_file = settings.cache_file.unwrap_or_else(paths::cache_file);
        let writer = Arc::new(CacheWriter::open(cache_file).await);

        Ok(Self {
            writer,
            executor: Executor::new(settings.min_worker_share, settings.max_workers),
            classifier,
        })
    }

    /// Resolves every domain in the set and folds the results into the
    /// cache. Returns once all batches are applied and the final snapshot
    /// is persisted.
    pub async fn batch_resolve(
        &self,
        domains: HashSet<String>,
        options: ProcessorOptions,
    ) -> Result<()> {
        self.executor
            .execute(
                domains.into_iter().collect(),
                Arc::clone(&self.classifier),
                options,
                Arc::clone(&self.writer),
            )
            .await
    }

    /// Re-resolves every domain in a provisional class.
    ///
    /// `resolvable` and `unresolvable` are considered settled and are never
    /// re-queried.
    pub async fn refresh_cache(&self, options: ProcessorOptions) -> Result<()> {
        let domains = self.writer.union_of(&ResolutionClass::PROVISIONAL).await;
        info!("Refreshing {} provisional domains", domains.len());
        self.batch_resolve(domains, options).await
    }

    /// Seeds domains the cache has never seen into the `none` class.
    pub async fn update(&self, domains: &HashSet<String>) -> Result<()> {
        self.writer.update(domains).await
    }

    /// Drops every cached domain that is no longer in `referenced`.
    pub async fn compact(&self, referenced: &HashSet<String>) -> Result<()> {
        self.writer.intersection_update(referenced).await
    }

    /// Per-class intersection of `domains` with the cache.
    pub async fn intersect_sets(
        &self,
        domains: &HashSet<String>,
    ) -> HashMap<ResolutionClass, HashSet<String>> {
        let view = self.writer.view().await;
        ResolutionClass::ALL
            .into_iter()
            .map(|class| {
                let hits = view.set(class).intersection(domains).cloned().collect();
                (class, hits)
            })
            .collect()
    }

    /// Per-class cardinality of the intersection of `domains` with the
    /// cache.
    pub async fn intersect_stats(&self, domains: &HashSet<String>) -> CacheStats {
        let view = self.writer.view().await;
        let count = |class: ResolutionClass| view.set(class).intersection(domains).count();
        CacheStats {
            resolvable: count(ResolutionClass::Resolvable),
            unresolvable: count(ResolutionClass::Unresolvable),
            none: count(ResolutionClass::None),
            name_server_error: count(ResolutionClass::NameServerError),
            timeout: count(ResolutionClass::Timeout),
            dns_error: count(ResolutionClass::DnsError),
            error: count(ResolutionClass::Error),
        }
    }

    /// The subset of `domains` currently leaning resolvable
    /// (`resolvable`, `timeout` or `none`).
    pub async fn resolvable_of(&self, domains: &HashSet<String>) -> HashSet<String> {
        let cached = self.writer.union_of(&RESOLVABLE_LEANING).await;
        domains.intersection(&cached).cloned().collect()
    }

    /// The subset of `domains` currently unresolved: the exact complement
    /// of [`DomainResolver::resolvable_of`] within the cache.
    pub async fn unresolved_of(&self, domains: &HashSet<String>) -> HashSet<String> {
        let cached = self.writer.union_of(&UNRESOLVED_LEANING).await;
        domains.intersection(&cached).cloned().collect()
    }

    /// Current per-class cardinalities.
    pub async fn stats(&self) -> CacheStats {
        self.writer.stats().await
    }

    /// The class currently holding `domain`, if any.
    pub async fn find(&self, domain: &str) -> Option<ResolutionClass> {
        self.writer.find(domain).await
    }

    /// Checks the disjointness invariant, logging any violation.
    pub async fn sanity(&self) -> bool {
        self.writer.sanity().await
    }
}
