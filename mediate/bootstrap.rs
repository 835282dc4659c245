use crate::cox::SurvivalRegression;
use crate::estimate::{MediationError, MediationResult, estimate_mediation};
use crate::resample::resample;
use crate::seeding::RngStreams;
use crate::types::SurvivalDataset;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::IsTerminal;
use thiserror::Error;

/// What to do when a replicate's estimate cannot be used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Leave the replicate out of the standard error and count it.
    #[default]
    Exclude,
    /// Stop at the first failed replicate.
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub replicates: usize,
    /// Normal quantile for the interval; 1.96 gives 95% coverage.
    pub z: f64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            replicates: 100,
            z: 1.96,
            failure_policy: FailurePolicy::Exclude,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.replicates == 0 {
            return Err(BootstrapError::NoReplicates);
        }
        if !(self.z.is_finite() && self.z > 0.0) {
            return Err(BootstrapError::InvalidQuantile(self.z));
        }
        Ok(())
    }
}

/// Why a replicate's estimate was not usable on the log scale.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplicateFailure {
    #[error(transparent)]
    Estimation(#[from] MediationError),
    #[error("mediated proportion {0} is not positive, so its logarithm is undefined")]
    NonPositiveProportion(f64),
}

/// Per-kind tally of replicates left out of the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionCounts {
    pub not_converged: usize,
    pub zero_total_effect: usize,
    pub fit_failed: usize,
    pub non_positive: usize,
}

impl ExclusionCounts {
    fn record(&mut self, failure: &ReplicateFailure) {
        match failure {
            ReplicateFailure::Estimation(MediationError::DidNotConverge { .. }) => {
                self.not_converged += 1
            }
            ReplicateFailure::Estimation(MediationError::ZeroTotalEffect) => {
                self.zero_total_effect += 1
            }
            ReplicateFailure::Estimation(_) => self.fit_failed += 1,
            ReplicateFailure::NonPositiveProportion(_) => self.non_positive += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.not_converged + self.zero_total_effect + self.fit_failed + self.non_positive
    }
}

impl fmt::Display for ExclusionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} not converged, {} zero total effect, {} fit failures, {} non-positive proportions",
            self.not_converged, self.zero_total_effect, self.fit_failed, self.non_positive
        )
    }
}

/// Outcome of a single bootstrap replicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateOutcome {
    /// 1-based replicate number.
    pub index: usize,
    pub result: Result<MediationResult, ReplicateFailure>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap replicate count must be positive")]
    NoReplicates,
    #[error("interval quantile z must be finite and positive, found {0}")]
    InvalidQuantile(f64),
    #[error("point estimate on the full population failed: {0}")]
    PointEstimate(#[source] MediationError),
    #[error("point estimate of the mediated proportion is {0}; a log-scale interval needs a positive value")]
    NonPositivePointEstimate(f64),
    #[error("bootstrap aborted at replicate {index}: {failure}")]
    ReplicateAborted {
        index: usize,
        #[source]
        failure: ReplicateFailure,
    },
    #[error("only {accepted} usable replicates ({excluded}); at least 2 are needed for a standard error")]
    InsufficientReplicates {
        accepted: usize,
        excluded: ExclusionCounts,
    },
}

/// Point estimate, log-scale standard error and back-transformed interval.
#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub point: MediationResult,
    pub z: f64,
    /// Mediated proportions of the accepted replicates, in replicate order.
    pub estimates: Vec<f64>,
    pub se_log: f64,
    pub lower: f64,
    pub upper: f64,
    pub exclusions: ExclusionCounts,
    pub replicates: Vec<ReplicateOutcome>,
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((ss / (n - 1.0)).sqrt())
}

/// `[exp(ln p - z se), exp(ln p + z se)]`.
pub fn log_scale_interval(point: f64, se_log: f64, z: f64) -> (f64, f64) {
    let center = point.ln();
    ((center - z * se_log).exp(), (center + z * se_log).exp())
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

fn evaluate_replicate<R: SurvivalRegression + ?Sized>(
    replicate: &SurvivalDataset,
    regression: &R,
) -> Result<MediationResult, ReplicateFailure> {
    let result = estimate_mediation(replicate, regression)?;
    if result.mediated_proportion <= 0.0 {
        return Err(ReplicateFailure::NonPositiveProportion(
            result.mediated_proportion,
        ));
    }
    Ok(result)
}

/// Bootstrap the mediated proportion of `population`.
///
/// The point estimate comes from the full population; replicate `i` resamples
/// the population with the generator `streams.replicate(i)`, so every
/// replicate is reproducible on its own. Failed replicates are handled
/// according to `config.failure_policy`.
pub fn run_bootstrap<R: SurvivalRegression + ?Sized>(
    population: &SurvivalDataset,
    regression: &R,
    config: &BootstrapConfig,
    streams: &RngStreams,
) -> Result<BootstrapSummary, BootstrapError> {
    config.validate()?;

    let point = estimate_mediation(population, regression).map_err(BootstrapError::PointEstimate)?;
    log::info!(
        "Point estimate: direct {:.4}, total {:.4}, mediated proportion {:.4}",
        point.direct_effect,
        point.total_effect,
        point.mediated_proportion
    );
    if point.mediated_proportion <= 0.0 {
        return Err(BootstrapError::NonPositivePointEstimate(
            point.mediated_proportion,
        ));
    }

    let pb = create_progress_bar(config.replicates as u64, "bootstrap replicates");
    let mut replicates = Vec::with_capacity(config.replicates);
    let mut estimates = Vec::with_capacity(config.replicates);
    let mut exclusions = ExclusionCounts::default();

    for i in 0..config.replicates {
        let mut rng = streams.replicate(i);
        let replicate = resample(population, &mut rng);
        let result = evaluate_replicate(&replicate, regression);
        match &result {
            Ok(r) => estimates.push(r.mediated_proportion),
            Err(failure) => {
                log::debug!("Replicate {} failed: {}", i + 1, failure);
                if config.failure_policy == FailurePolicy::Abort {
                    pb.abandon();
                    return Err(BootstrapError::ReplicateAborted {
                        index: i + 1,
                        failure: failure.clone(),
                    });
                }
                exclusions.record(failure);
            }
        }
        replicates.push(ReplicateOutcome {
            index: i + 1,
            result,
        });
        pb.inc(1);
    }
    pb.finish_with_message("bootstrap complete");

    if exclusions.total() > 0 {
        log::warn!(
            "Excluded {} of {} bootstrap replicates: {}",
            exclusions.total(),
            config.replicates,
            exclusions
        );
    }

    let logs: Vec<f64> = estimates.iter().map(|p| p.ln()).collect();
    let se_log = sample_std_dev(&logs).ok_or(BootstrapError::InsufficientReplicates {
        accepted: estimates.len(),
        excluded: exclusions,
    })?;
    let (lower, upper) = log_scale_interval(point.mediated_proportion, se_log, config.z);
    log::info!(
        "Bootstrap over {} replicates: se(log p) = {:.4}, interval [{:.4}, {:.4}]",
        estimates.len(),
        se_log,
        lower,
        upper
    );

    Ok(BootstrapSummary {
        point,
        z: config.z,
        estimates,
        se_log,
        lower,
        upper,
        exclusions,
        replicates,
    })
}
