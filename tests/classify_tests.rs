use anyhow::Result;
use domainvet::classify::{
    with_lifetime_retry, AttemptOutcome, Classifier, Classify, ResolutionClass, UpstreamConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[test]
fn test_class_names_and_ordinals_are_stable() {
    let expected = [
        (0, "resolvable", ResolutionClass::Resolvable),
        (1, "unresolvable", ResolutionClass::Unresolvable),
        (2, "none", ResolutionClass::None),
        (3, "nameServerError", ResolutionClass::NameServerError),
        (4, "timeout", ResolutionClass::Timeout),
        (5, "dnsError", ResolutionClass::DnsError),
        (6, "error", ResolutionClass::Error),
    ];

    assert_eq!(ResolutionClass::ALL.len(), expected.len());
    for (ordinal, name, class) in expected {
        assert_eq!(class.ordinal(), ordinal);
        assert_eq!(class.name(), name);
        assert_eq!(class.to_string(), name);
        assert_eq!(ResolutionClass::from_name(name), Some(class));
    }

    assert_eq!(ResolutionClass::from_name("bogus"), None);
    assert_eq!(ResolutionClass::from_name("0"), None);
}

#[test]
fn test_provisional_excludes_settled_classes() {
    assert!(!ResolutionClass::PROVISIONAL.contains(&ResolutionClass::Resolvable));
    assert!(!ResolutionClass::PROVISIONAL.contains(&ResolutionClass::Unresolvable));
    assert_eq!(ResolutionClass::PROVISIONAL.len(), ResolutionClass::ALL.len() - 2);
}

#[test]
fn test_wire_names_survive_serde() -> Result<()> {
    // The on-disk representation is the camelCase name, never the ordinal
    let json = serde_json::to_string(&ResolutionClass::NameServerError)?;
    assert_eq!(json, "\"nameServerError\"");

    let class: ResolutionClass = serde_json::from_str("\"dnsError\"")?;
    assert_eq!(class, ResolutionClass::DnsError);
    assert!(serde_json::from_str::<ResolutionClass>("3").is_err());

    Ok(())
}

#[test]
fn test_default_upstream_config() {
    let config = UpstreamConfig::default();
    assert_eq!(
        config.nameservers,
        vec![
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
        ]
    );
    assert!(config.rotate);
    assert_eq!(config.lifetime, Duration::from_secs(6));
    assert_eq!(config.retries, 3);
}

#[test]
fn test_classifier_requires_a_nameserver() {
    let config = UpstreamConfig {
        nameservers: vec![],
        ..UpstreamConfig::default()
    };
    assert!(Classifier::new(&config).is_err());
}

#[test]
fn test_classifier_creation_with_defaults() {
    assert!(Classifier::new(&UpstreamConfig::default()).is_ok());
}

#[tokio::test]
async fn test_grown_budget_lets_a_slow_lookup_succeed() {
    // An attempt that needs 150ms against an initial lifetime of 100ms:
    // the first try times out, the retry runs under the grown 200ms budget
    // and must come back resolvable rather than timeout
    let attempts = AtomicUsize::new(0);

    let (class, domain) = with_lifetime_retry(
        "slow-but-alive.test",
        Duration::from_millis(100),
        3,
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(150)).await;
                AttemptOutcome::Settled(ResolutionClass::Resolvable)
            }
        },
    )
    .await;

    assert_eq!(class, ResolutionClass::Resolvable);
    assert_eq!(domain, "slow-but-alive.test");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retries_exhausted_settle_as_timeout() {
    // An attempt that never finishes inside any budget: initial try plus
    // every retry runs, then the domain settles as timeout
    let attempts = AtomicUsize::new(0);

    let (class, _) = with_lifetime_retry("tarpit.test", Duration::from_millis(50), 2, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async {
            sleep(Duration::from_secs(30)).await;
            AttemptOutcome::Settled(ResolutionClass::Resolvable)
        }
    })
    .await;

    assert_eq!(class, ResolutionClass::Timeout);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_settled_outcomes_are_terminal() {
    // Anything other than a timeout returns immediately, with no retry
    let attempts = AtomicUsize::new(0);

    let (class, _) = with_lifetime_retry("nx.test", Duration::from_secs(1), 3, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { AttemptOutcome::Settled(ResolutionClass::Unresolvable) }
    })
    .await;

    assert_eq!(class, ResolutionClass::Unresolvable);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

// Exercises the never-fails contract against a nameserver that will not
// cooperate. Whatever the local network does with 127.0.0.1:53, the one
// class that cannot come back for a reserved .invalid name is resolvable,
// and the retry budget keeps the whole call bounded.
#[tokio::test]
async fn test_classify_returns_a_class_for_an_uncooperative_upstream() {
    let config = UpstreamConfig {
        nameservers: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
        rotate: false,
        lifetime: Duration::from_secs(1),
        retries: 1,
    };
    let classifier = Classifier::new(&config).expect("classifier should build");

    let start = Instant::now();
    let (class, domain) = classifier.classify("domainvet-probe.invalid").await;

    assert_eq!(domain, "domainvet-probe.invalid");
    assert_ne!(class, ResolutionClass::Resolvable);
    assert_ne!(class, ResolutionClass::None);
    // 1s budget, one retry with 1s sleep and a 2s budget, plus slack
    assert!(start.elapsed() < Duration::from_secs(10));
}
