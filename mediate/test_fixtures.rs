//! Test fixtures and builders for survmed tests.
//!
//! Provides seeded synthetic populations and a scripted regression so that
//! estimator and bootstrap tests do not repeat simulation boilerplate.

use crate::cox::{CoxError, CoxFit, CoxStatus, SurvivalRegression};
use crate::mediator::MediatorModel;
use crate::sampler::CorrelatedSampler;
use crate::seeding::{RngStreams, Stream};
use crate::survival::{HazardSpec, simulate_survival};
use crate::types::{Covariate, CovariateTable, SurvivalDataset};
use ndarray::{Array1, Array2, array};
use std::cell::Cell;

/// Exposure/confounder covariance used throughout: unit variances with
/// correlations -0.3 (exposure, confounder1), -0.2 (exposure, confounder2)
/// and 0.1 (confounder1, confounder2).
pub fn default_covariance() -> Array2<f64> {
    array![[1.0, -0.3, -0.2], [-0.3, 1.0, 0.1], [-0.2, 0.1, 1.0]]
}

/// Builder for seeded covariate tables drawn the same way as the pipeline.
pub struct CovariateTableBuilder {
    n_samples: usize,
    seed: u64,
    mediator: MediatorModel,
}

impl CovariateTableBuilder {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            seed: 42,
            mediator: MediatorModel::default(),
        }
    }

    /// Set the random seed for reproducibility.
    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self
    }

    pub fn build(self) -> CovariateTable {
        let streams = RngStreams::new(self.seed);
        let sampler = CorrelatedSampler::new(
            vec![
                Covariate::Exposure,
                Covariate::Confounder1,
                Covariate::Confounder2,
            ],
            Array1::zeros(3),
            default_covariance(),
        )
        .expect("default covariance is positive definite");
        let draws = sampler
            .sample(self.n_samples, &mut streams.stream(Stream::Sampler))
            .expect("sample size is positive");
        let exposure = draws.values.column(0).to_owned();
        let mediator = self
            .mediator
            .generate(exposure.view(), &mut streams.stream(Stream::MediatorNoise));
        CovariateTable::new(
            exposure,
            draws.values.column(1).to_owned(),
            draws.values.column(2).to_owned(),
            mediator,
        )
        .expect("columns share a length")
    }
}

/// Builder for seeded survival datasets.
pub struct SurvivalDatasetBuilder {
    covariates: CovariateTableBuilder,
    seed: u64,
    hazard: HazardSpec,
    max_follow_up: f64,
}

impl SurvivalDatasetBuilder {
    pub fn new(n_samples: usize) -> Self {
        Self {
            covariates: CovariateTableBuilder::new(n_samples),
            seed: 42,
            hazard: HazardSpec::default(),
            max_follow_up: 12.0,
        }
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self.covariates = self.covariates.seed(s);
        self
    }

    pub fn with_hazard(mut self, hazard: HazardSpec) -> Self {
        self.hazard = hazard;
        self
    }

    pub fn build(self) -> SurvivalDataset {
        let table = self.covariates.build();
        let mut rng = RngStreams::new(self.seed).stream(Stream::EventTimes);
        simulate_survival(table, &self.hazard, self.max_follow_up, &mut rng)
            .expect("default hazard specification is valid")
            .dataset
    }
}

/// Regression stub that replays scripted exposure coefficients.
///
/// Fits that include the mediator return `direct`, fits without it return
/// `total`. Every call is counted so tests can check how often the
/// estimator reached the regression.
pub struct ScriptedRegression {
    pub total: Result<f64, CoxError>,
    pub direct: Result<f64, CoxError>,
    pub status: CoxStatus,
    pub calls: Cell<usize>,
}

impl ScriptedRegression {
    pub fn new(total: f64, direct: f64) -> Self {
        Self {
            total: Ok(total),
            direct: Ok(direct),
            status: CoxStatus::Converged,
            calls: Cell::new(0),
        }
    }
}

impl SurvivalRegression for ScriptedRegression {
    fn fit(&self, data: &SurvivalDataset, covariates: &[Covariate]) -> Result<CoxFit, CoxError> {
        self.calls.set(self.calls.get() + 1);
        let exposure = if covariates.contains(&Covariate::Mediator) {
            self.direct.clone()?
        } else {
            self.total.clone()?
        };
        let mut coefficients = Array1::zeros(covariates.len());
        if let Some(j) = covariates.iter().position(|&c| c == Covariate::Exposure) {
            coefficients[j] = exposure;
        }
        Ok(CoxFit {
            covariates: covariates.to_vec(),
            coefficients,
            standard_errors: Array1::from_elem(covariates.len(), 0.01),
            log_likelihood: -(data.event_count() as f64),
            null_log_likelihood: -(data.event_count() as f64) - 1.0,
            iterations: 4,
            status: self.status,
        })
    }
}
