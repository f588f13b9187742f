//! Persistent resolution cache
//!
//! The cache maps each [`ResolutionClass`] to the set of domains currently
//! classified that way. It is a fixed-arity product of seven sets rather
//! than a dynamic map, with one core invariant: the sets are pairwise
//! disjoint, so every domain lives in exactly one class at a time.
//!
//! All mutation goes through [`CacheWriter`], the single custodian of both
//! the in-memory state and the on-disk snapshot. Every mutator runs under
//! one mutual-exclusion region, and the snapshot is rewritten after each
//! applied batch, so a crash at any point loses at most the batches that
//! had not yet been applied.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::classify::{Batch, ResolutionClass};
use crate::snapshot::{Snapshot, SnapshotFile};

/// Per-class cardinalities, in ordinal order.
///
/// Serialized as the `stats` block at the head of the snapshot document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStats {
    pub resolvable: usize,
    pub unresolvable: usize,
    pub none: usize,
    #[serde(rename = "nameServerError")]
    pub name_server_error: usize,
    pub timeout: usize,
    #[serde(rename = "dnsError")]
    pub dns_error: usize,
    pub error: usize,
}

impl CacheStats {
    /// Cardinality recorded for one class.
    pub fn of(&self, class: ResolutionClass) -> usize {
        match class {
            ResolutionClass::Resolvable => self.resolvable,
            ResolutionClass::Unresolvable => self.unresolvable,
            ResolutionClass::None => self.none,
            ResolutionClass::NameServerError => self.name_server_error,
            ResolutionClass::Timeout => self.timeout,
            ResolutionClass::DnsError => self.dns_error,
            ResolutionClass::Error => self.error,
        }
    }

    /// Sum over all classes.
    pub fn total(&self) -> usize {
        ResolutionClass::ALL.into_iter().map(|c| self.of(c)).sum()
    }
}

/// In-memory classification state: one domain set per class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionCache {
    resolvable: HashSet<String>,
    unresolvable: HashSet<String>,
    none: HashSet<String>,
    name_server_error: HashSet<String>,
    timeout: HashSet<String>,
    dns_error: HashSet<String>,
    error: HashSet<String>,
}

impl ResolutionCache {
    /// The domain set currently holding `class`.
    pub fn set(&self, class: ResolutionClass) -> &HashSet<String> {
        match class {
            ResolutionClass::Resolvable => &self.resolvable,
            ResolutionClass::Unresolvable => &self.unresolvable,
            ResolutionClass::None => &self.none,
            ResolutionClass::NameServerError => &self.name_server_error,
            ResolutionClass::Timeout => &self.timeout,
            ResolutionClass::DnsError => &self.dns_error,
            ResolutionClass::Error => &self.error,
        }
    }

    fn set_mut(&mut self, class: ResolutionClass) -> &mut HashSet<String> {
        match class {
            ResolutionClass::Resolvable => &mut self.resolvable,
            ResolutionClass::Unresolvable => &mut self.unresolvable,
            ResolutionClass::None => &mut self.none,
            ResolutionClass::NameServerError => &mut self.name_server_error,
            ResolutionClass::Timeout => &mut self.timeout,
            ResolutionClass::DnsError => &mut self.dns_error,
            ResolutionClass::Error => &mut self.error,
        }
    }

    /// Current per-class cardinalities.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resolvable: self.resolvable.len(),
            unresolvable: self.unresolvable.len(),
            none: self.none.len(),
            name_server_error: self.name_server_error.len(),
            timeout: self.timeout.len(),
            dns_error: self.dns_error.len(),
            error: self.error.len(),
        }
    }

    /// The class currently holding `domain`, if any.
    pub fn find(&self, domain: &str) -> Option<ResolutionClass> {
        ResolutionClass::ALL
            .into_iter()
            .find(|&class| self.set(class).contains(domain))
    }

    /// Domains from `domains` that are absent from every class.
    pub fn difference(&self, domains: &HashSet<String>) -> HashSet<String> {
        domains
            .iter()
            .filter(|d| self.find(d).is_none())
            .cloned()
            .collect()
    }

    /// Union of the given classes' sets.
    pub fn union_of(&self, classes: &[ResolutionClass]) -> HashSet<String> {
        classes
            .iter()
            .flat_map(|&class| self.set(class).iter().cloned())
            .collect()
    }

    /// Moves every domain in `domains` into `class`, removing it from all
    /// other classes first so disjointness is preserved.
    fn reclassify(&mut self, class: ResolutionClass, domains: &HashSet<String>) {
        for other in ResolutionClass::ALL {
            if other != class {
                self.set_mut(other).retain(|d| !domains.contains(d));
            }
        }
        self.set_mut(class).extend(domains.iter().cloned());
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            stats: self.stats(),
            resolvable: self.resolvable.clone(),
            unresolvable: self.unresolvable.clone(),
            none: self.none.clone(),
            name_server_error: self.name_server_error.clone(),
            timeout: self.timeout.clone(),
            dns_error: self.dns_error.clone(),
            error: self.error.clone(),
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            resolvable: snapshot.resolvable,
            unresolvable: snapshot.unresolvable,
            none: snapshot.none,
            name_server_error: snapshot.name_server_error,
            timeout: snapshot.timeout,
            dns_error: snapshot.dns_error,
            error: snapshot.error,
        }
    }
}

/// Single-writer custodian of the resolution cache.
///
/// Owns the only mutable copy of the cache plus its snapshot file. Mutators
/// (`apply_batch`, `update`, `intersection_update`, `balance`) serialize on
/// one async mutex; readers either take the same lock briefly or work from
/// the cloned view returned by [`CacheWriter::view`].
pub struct CacheWriter {
    state: Mutex<ResolutionCache>,
    file: SnapshotFile,
}

impl CacheWriter {
    /// Opens the writer over the snapshot at `path`, loading prior state if
    /// any exists (including recovery from an interrupted write).
    pub async fn open(path: PathBuf) -> Self {
        let file = SnapshotFile::new(path);
        let cache = ResolutionCache::from_snapshot(file.read().await);
        let stats = cache.stats();
        if stats.total() > 0 {
            info!(
                "Loaded {} cached domains from {}",
                stats.total(),
                file.path().display()
            );
        }
        Self {
            state: Mutex::new(cache),
            file,
        }
    }

    /// Applies one batch of classification results and persists a snapshot.
    ///
    /// The batch is grouped into consecutive runs of the same class (so a
    /// domain appearing twice keeps last-result-wins semantics); each group
    /// is removed from every other class and unioned into its own. The
    /// snapshot write happens under the same lock, after the whole batch is
    /// applied.
    ///
    /// # Errors
    ///
    /// Only the snapshot write can fail. The in-memory state is already
    /// updated at that point, so the caller may log and carry on; the next
    /// successful persist covers the gap.
    pub async fn apply_batch(&self, batch: Batch) -> Result<()> {
        let mut cache = self.state.lock().await;

        let mut results = batch.into_iter().peekable();
        while let Some((class, domain)) = results.next() {
            let mut group = HashSet::from([domain]);
            while let Some((next, _)) = results.peek() {
                if *next != class {
                    break;
                }
                if let Some((_, domain)) = results.next() {
                    group.insert(domain);
                }
            }
            cache.reclassify(class, &group);
        }

        self.file.write(&cache.to_snapshot()).await
    }

    /// Seeds domains that are not yet classified anywhere into `none`.
    ///
    /// Already-classified domains are left untouched. Persists only when
    /// something was actually inserted.
    pub async fn update(&self, domains: &HashSet<String>) -> Result<()> {
        let mut cache = self.state.lock().await;
        let unseen = cache.difference(domains);
        if unseen.is_empty() {
            return Ok(());
        }
        debug!("Seeding {} new domains", unseen.len());
        cache.set_mut(ResolutionClass::None).extend(unseen);
        self.file.write(&cache.to_snapshot()).await
    }

    /// Compacts the cache down to `referenced`: every class keeps only the
    /// domains still present in some source list.
    pub async fn intersection_update(&self, referenced: &HashSet<String>) -> Result<()> {
        let mut cache = self.state.lock().await;
        for class in ResolutionClass::ALL {
            cache.set_mut(class).retain(|d| referenced.contains(d));
        }
        self.file.write(&cache.to_snapshot()).await
    }

    /// Repairs disjointness by removing from `target` any domain that also
    /// appears in another class. Useful after external edits to the
    /// snapshot file.
    pub async fn balance(&self, target: ResolutionClass) -> Result<()> {
        let mut cache = self.state.lock().await;
        let others: HashSet<String> = ResolutionClass::ALL
            .into_iter()
            .filter(|&c| c != target)
            .flat_map(|c| cache.set(c).iter().cloned())
            .collect();
        cache.set_mut(target).retain(|d| !others.contains(d));
        self.file.write(&cache.to_snapshot()).await
    }

    /// Checks pairwise disjointness and logs every violation found.
    ///
    /// Diagnostic only; a violation is reported, not raised.
    pub async fn sanity(&self) -> bool {
        let cache = self.state.lock().await;
        let mut clean = true;
        for (i, &left) in ResolutionClass::ALL.iter().enumerate() {
            for &right in &ResolutionClass::ALL[i + 1..] {
                let overlap = cache.set(left).intersection(cache.set(right)).count();
                if overlap > 0 {
                    clean = false;
                    error!(
                        "{} ({} domains) overlaps {} ({} domains) by {} elements",
                        left,
                        cache.set(left).len(),
                        right,
                        cache.set(right).len(),
                        overlap
                    );
                }
            }
        }
        clean
    }

    /// Current per-class cardinalities.
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats()
    }

    /// The class currently holding `domain`, if any.
    pub async fn find(&self, domain: &str) -> Option<ResolutionClass> {
        self.state.lock().await.find(domain)
    }

    /// Union of the given classes' domain sets.
    pub async fn union_of(&self, classes: &[ResolutionClass]) -> HashSet<String> {
        self.state.lock().await.union_of(classes)
    }

    /// A snapshot-consistent clone of the whole cache for read-heavy work.
    pub async fn view(&self) -> ResolutionCache {
        self.state.lock().await.clone()
    }

    /// Persists the current state unconditionally.
    pub async fn persist(&self) -> Result<()> {
        let cache = self.state.lock().await;
        self.file.write(&cache.to_snapshot()).await
    }
}
