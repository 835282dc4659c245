use approx::assert_abs_diff_eq;
use survmed::bootstrap::FailurePolicy;
use survmed::config::SimulationConfig;
use survmed::pipeline::run_analysis;

#[test]
fn default_design_recovers_reference_proportion() {
    let mut config = SimulationConfig::default();
    config.bootstrap.replicates = 40;

    let report = run_analysis(&config).expect("default analysis runs");
    let summary = &report.summary;
    let point = summary.point.mediated_proportion;

    assert_eq!(report.cohort.dataset.len(), 10_000);
    assert!(
        (0.26..0.42).contains(&point),
        "mediated proportion {point} is far from the reference value 0.34"
    );
    assert!(summary.lower < point && point < summary.upper);
    assert!(summary.lower > 0.2, "lower bound {}", summary.lower);
    assert!(summary.upper < 0.55, "upper bound {}", summary.upper);
    assert_eq!(summary.exclusions.total(), 0);

    // Effects of the data-generating design: the direct effect is the
    // exposure coefficient, the total effect adds the path through the mediator.
    assert_abs_diff_eq!(summary.point.direct_effect, 0.4, epsilon = 0.08);
    assert!(summary.point.total_effect > summary.point.direct_effect);
}

#[test]
fn identical_seeds_give_bit_identical_intervals() {
    let mut config = SimulationConfig::default();
    config.sample_size = 1_500;
    config.bootstrap.replicates = 8;
    config.seed = 99;

    let a = run_analysis(&config).expect("first run");
    let b = run_analysis(&config).expect("second run");
    assert_eq!(a.cohort.dataset, b.cohort.dataset);
    assert_eq!(a.summary.estimates, b.summary.estimates);
    assert_eq!(a.summary.lower.to_bits(), b.summary.lower.to_bits());
    assert_eq!(a.summary.upper.to_bits(), b.summary.upper.to_bits());

    config.seed = 100;
    let c = run_analysis(&config).expect("third run");
    assert_ne!(a.summary.estimates, c.summary.estimates);
}

#[test]
fn abort_policy_completes_when_nothing_fails() {
    let mut config = SimulationConfig::default();
    config.sample_size = 2_000;
    config.bootstrap.replicates = 6;
    config.bootstrap.failure_policy = FailurePolicy::Abort;

    let report = run_analysis(&config).expect("no replicate fails on the default design");
    assert_eq!(report.summary.estimates.len(), 6);
}
