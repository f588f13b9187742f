use domainvet::progress::RuntimeEstimator;
use std::time::Duration;

#[test]
fn test_estimate_before_any_progress() {
    let estimator = RuntimeEstimator::new(500);
    let estimate = estimator.estimate();

    assert_eq!(estimate.processed, 0);
    assert_eq!(estimate.remaining, 500);
    // No throughput yet, so no projection either
    assert_eq!(estimate.est_total, Duration::ZERO);
    assert_eq!(estimate.est_remaining, Duration::ZERO);
    assert!(!estimator.is_done());
}

#[test]
fn test_counters_aggregate_across_workers() {
    let estimator = RuntimeEstimator::new(100);

    estimator.update(0, 10);
    estimator.update(1, 20);
    estimator.update(0, 5);

    assert_eq!(estimator.processed(), 35);
    let estimate = estimator.estimate();
    assert_eq!(estimate.processed, 35);
    assert_eq!(estimate.remaining, 65);
}

#[test]
fn test_projection_scales_with_throughput() {
    let estimator = RuntimeEstimator::new(100);
    std::thread::sleep(Duration::from_millis(50));
    estimator.update(0, 50);

    let estimate = estimator.estimate();
    // Half done: the projected total is about twice the elapsed time, so
    // the remainder is about equal to it. Allow generous slack for timing.
    assert!(estimate.est_total >= estimate.est_remaining);
    assert!(estimate.est_total >= Duration::from_millis(50));
    assert!(estimate.est_total <= Duration::from_secs(5));
}

#[test]
fn test_done_and_overshoot_saturate() {
    let estimator = RuntimeEstimator::new(30);
    estimator.update(0, 30);
    assert!(estimator.is_done());
    assert_eq!(estimator.estimate().remaining, 0);

    // A stray extra credit must not underflow the remainder
    estimator.update(1, 5);
    assert_eq!(estimator.estimate().remaining, 0);
    assert!(estimator.is_done());
}
