use anyhow::Result;
use async_trait::async_trait;
use domainvet::classify::{Classification, Classify, ResolutionClass};
use domainvet::processor::ProcessorOptions;
use domainvet::resolver::{DomainResolver, ResolverSettings};
use domainvet::snapshot::{Snapshot, SnapshotFile};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use tempfile::tempdir;

/// Always answers `resolvable`, remembering what it was asked.
struct RecordingClassifier {
    queried: Mutex<Vec<String>>,
}

#[async_trait]
impl Classify for RecordingClassifier {
    async fn classify(&self, domain: &str) -> Classification {
        self.queried.lock().unwrap().push(domain.to_string());
        (ResolutionClass::Resolvable, domain.to_string())
    }
}

fn domain_set(domains: &[&str]) -> HashSet<String> {
    domains.iter().map(|d| d.to_string()).collect()
}

// The facade is a process-wide singleton, so its whole lifecycle lives in
// one test: seeded refresh, intersection queries, and finally the singleton
// guarantee itself.
#[tokio::test]
async fn test_facade_lifecycle_and_singleton() -> Result<()> {
    let dir = tempdir()?;
    let cache_path = dir.path().join("cache.json");

    // Pre-seed the snapshot the way a prior run would have left it
    let seeded = Snapshot {
        resolvable: domain_set(&["r.test"]),
        unresolvable: domain_set(&["u.test"]),
        none: domain_set(&["n.test"]),
        timeout: domain_set(&["t.test"]),
        ..Snapshot::default()
    };
    SnapshotFile::new(cache_path.clone()).write(&seeded).await?;

    let classifier = Arc::new(RecordingClassifier {
        queried: Mutex::new(Vec::new()),
    });
    let settings = ResolverSettings {
        cache_file: Some(cache_path),
        ..ResolverSettings::default()
    };
    let resolver =
        DomainResolver::with_classifier(settings.clone(), Arc::clone(&classifier) as Arc<dyn Classify>)
            .await?;

    // Refresh re-queries only the provisional entries: the settled r and u
    // must not be touched
    resolver.refresh_cache(ProcessorOptions::default()).await?;

    let queried: HashSet<String> = classifier.queried.lock().unwrap().iter().cloned().collect();
    assert_eq!(queried, domain_set(&["n.test", "t.test"]));

    let stats = resolver.stats().await;
    assert_eq!(stats.resolvable, 3);
    assert_eq!(stats.unresolvable, 1);
    assert_eq!(stats.total(), 4);
    assert_eq!(resolver.find("n.test").await, Some(ResolutionClass::Resolvable));
    assert_eq!(resolver.find("t.test").await, Some(ResolutionClass::Resolvable));
    assert_eq!(resolver.find("u.test").await, Some(ResolutionClass::Unresolvable));
    assert!(resolver.sanity().await);

    // Intersection queries against a mixed probe set
    let probe = domain_set(&["r.test", "u.test", "stranger.test"]);

    let sets = resolver.intersect_sets(&probe).await;
    assert_eq!(sets[&ResolutionClass::Resolvable], domain_set(&["r.test"]));
    assert_eq!(
        sets[&ResolutionClass::Unresolvable],
        domain_set(&["u.test"])
    );
    assert!(sets[&ResolutionClass::None].is_empty());

    let istats = resolver.intersect_stats(&probe).await;
    assert_eq!(istats.resolvable, 1);
    assert_eq!(istats.unresolvable, 1);
    assert_eq!(istats.total(), 2);

    // resolvable_of / unresolved_of partition the cached part of any input
    let resolvable = resolver.resolvable_of(&probe).await;
    let unresolved = resolver.unresolved_of(&probe).await;
    assert_eq!(resolvable, domain_set(&["r.test"]));
    assert_eq!(unresolved, domain_set(&["u.test"]));
    assert!(resolvable.is_disjoint(&unresolved));

    // update seeds only the never-seen domain
    resolver.update(&probe).await?;
    assert_eq!(
        resolver.find("stranger.test").await,
        Some(ResolutionClass::None)
    );

    // compact drops everything no longer referenced
    resolver.compact(&domain_set(&["r.test", "u.test"])).await?;
    assert_eq!(resolver.find("stranger.test").await, None);
    assert_eq!(resolver.stats().await.total(), 2);

    // A second facade in the same process must fail fast
    let second = DomainResolver::with_classifier(settings, classifier).await;
    assert!(second.is_err());
    assert!(second.unwrap_err().to_string().contains("singleton"));

    Ok(())
}
