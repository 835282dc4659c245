use crate::types::{Covariate, CovariateTable, SurvivalDataset, TableError};
use ndarray::Array1;
use rand::Rng;
use rand::distributions::Open01;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while validating a hazard specification or simulating outcomes.
#[derive(Debug, Error)]
pub enum SurvivalError {
    #[error("Weibull shape must be finite and positive, found {0}")]
    InvalidShape(f64),
    #[error("Weibull scale must be finite and positive, found {0}")]
    InvalidScale(f64),
    #[error("maximum follow-up time must be finite and positive, found {0}")]
    InvalidFollowUp(f64),
    #[error("log-hazard coefficient for '{0}' must be finite")]
    NonFiniteCoefficient(Covariate),
    #[error("covariate '{0}' has more than one log-hazard coefficient")]
    DuplicateCoefficient(Covariate),
    #[error("cannot simulate outcomes for an empty covariate table")]
    EmptyTable,
    #[error("simulated dataset is inconsistent: {0}")]
    Table(#[from] TableError),
}

/// Parametric baseline hazard family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum BaselineHazard {
    /// `h0(t) = scale * shape * t^(shape - 1)`.
    Weibull { shape: f64, scale: f64 },
}

impl BaselineHazard {
    pub fn validate(&self) -> Result<(), SurvivalError> {
        match *self {
            BaselineHazard::Weibull { shape, scale } => {
                if !(shape.is_finite() && shape > 0.0) {
                    return Err(SurvivalError::InvalidShape(shape));
                }
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(SurvivalError::InvalidScale(scale));
                }
                Ok(())
            }
        }
    }

    /// `H(t) exp(eta)`, the cumulative hazard of an individual with linear predictor `eta`.
    pub fn cumulative_hazard(&self, t: f64, eta: f64) -> f64 {
        match *self {
            BaselineHazard::Weibull { shape, scale } => scale * t.powf(shape) * eta.exp(),
        }
    }

    /// Solve `H(t) exp(eta) = target` for `t`.
    pub fn invert_cumulative_hazard(&self, target: f64, eta: f64) -> f64 {
        match *self {
            BaselineHazard::Weibull { shape, scale } => {
                (target / (scale * eta.exp())).powf(1.0 / shape)
            }
        }
    }
}

/// Log-linear proportional hazards specification.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardSpec {
    pub baseline: BaselineHazard,
    pub coefficients: Vec<(Covariate, f64)>,
}

impl Default for HazardSpec {
    fn default() -> Self {
        Self {
            baseline: BaselineHazard::Weibull {
                shape: 1.0,
                scale: 0.05,
            },
            coefficients: vec![
                (Covariate::Exposure, 0.4),
                (Covariate::Mediator, -0.3),
                (Covariate::Confounder1, -0.1),
                (Covariate::Confounder2, -0.3),
            ],
        }
    }
}

impl HazardSpec {
    pub fn validate(&self) -> Result<(), SurvivalError> {
        self.baseline.validate()?;
        for (idx, &(covariate, beta)) in self.coefficients.iter().enumerate() {
            if !beta.is_finite() {
                return Err(SurvivalError::NonFiniteCoefficient(covariate));
            }
            if self.coefficients[..idx].iter().any(|&(c, _)| c == covariate) {
                return Err(SurvivalError::DuplicateCoefficient(covariate));
            }
        }
        Ok(())
    }

    pub fn coefficient(&self, covariate: Covariate) -> f64 {
        self.coefficients
            .iter()
            .find(|&&(c, _)| c == covariate)
            .map_or(0.0, |&(_, beta)| beta)
    }

    /// Replace (or insert) the coefficient for `covariate`.
    pub fn with_coefficient(mut self, covariate: Covariate, beta: f64) -> Self {
        match self.coefficients.iter_mut().find(|(c, _)| *c == covariate) {
            Some(entry) => entry.1 = beta,
            None => self.coefficients.push((covariate, beta)),
        }
        self
    }

    pub fn linear_predictor(&self, table: &CovariateTable) -> Array1<f64> {
        let mut eta = Array1::zeros(table.len());
        for &(covariate, beta) in &self.coefficients {
            eta.scaled_add(beta, &table.column(covariate));
        }
        eta
    }
}

/// A simulated cohort together with the latent (uncensored) event times.
#[derive(Debug, Clone)]
pub struct SimulatedCohort {
    pub dataset: SurvivalDataset,
    /// Latent event time `t*` per row, before administrative censoring.
    /// Degenerate draws are stored as they were generated.
    pub latent_time: Array1<f64>,
    /// Rows whose latent time was non-finite or non-positive and were clamped to follow-up end.
    pub clamped: usize,
}

/// Generate right-censored event times by inverse-transform sampling of the
/// individual cumulative hazard.
///
/// For each row `U ~ Uniform(0, 1)` is drawn and `-ln U = H(t*) exp(eta)` is
/// solved for `t*`. The observed time is `min(t*, max_follow_up)` and the
/// status is `t* <= max_follow_up`. A latent time that is non-finite or
/// non-positive is clamped to `max_follow_up` and recorded as censored.
pub fn simulate_survival<R: Rng>(
    covariates: CovariateTable,
    hazard: &HazardSpec,
    max_follow_up: f64,
    rng: &mut R,
) -> Result<SimulatedCohort, SurvivalError> {
    hazard.validate()?;
    if !(max_follow_up.is_finite() && max_follow_up > 0.0) {
        return Err(SurvivalError::InvalidFollowUp(max_follow_up));
    }
    if covariates.is_empty() {
        return Err(SurvivalError::EmptyTable);
    }

    let eta = hazard.linear_predictor(&covariates);
    let n = covariates.len();
    let mut latent_time = Array1::zeros(n);
    let mut event_time = Array1::zeros(n);
    let mut status = Array1::from_elem(n, false);
    let mut clamped = 0usize;

    for i in 0..n {
        let u: f64 = rng.sample(Open01);
        let t_star = hazard.baseline.invert_cumulative_hazard(-u.ln(), eta[i]);
        latent_time[i] = t_star;
        if !(t_star.is_finite() && t_star > 0.0) {
            clamped += 1;
            event_time[i] = max_follow_up;
            continue;
        }
        if t_star <= max_follow_up {
            event_time[i] = t_star;
            status[i] = true;
        } else {
            event_time[i] = max_follow_up;
        }
    }

    if clamped > 0 {
        log::warn!(
            "{clamped} of {n} simulated event times were non-finite or non-positive; clamped to follow-up end {max_follow_up} and censored"
        );
    }

    let dataset = SurvivalDataset::new(covariates, event_time, status)?;
    log::info!(
        "Simulated {} survival records: {} events, {} censored at t = {}",
        n,
        dataset.event_count(),
        n - dataset.event_count(),
        max_follow_up
    );

    Ok(SimulatedCohort {
        dataset,
        latent_time,
        clamped,
    })
}
