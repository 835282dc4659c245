use crate::cox::{CoxError, CoxFit, SurvivalRegression};
use crate::types::{Covariate, SurvivalDataset};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Model A: adjusted for the mediator, gives the direct effect.
pub const MEDIATOR_ADJUSTED: [Covariate; 4] = [
    Covariate::Exposure,
    Covariate::Mediator,
    Covariate::Confounder1,
    Covariate::Confounder2,
];

/// Model B: mediator omitted, gives the total effect.
pub const MEDIATOR_OMITTED: [Covariate; 3] = [
    Covariate::Exposure,
    Covariate::Confounder1,
    Covariate::Confounder2,
];

/// Identifies which of the two regressions an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelRole {
    MediatorAdjusted,
    MediatorOmitted,
}

impl ModelRole {
    pub fn covariates(self) -> &'static [Covariate] {
        match self {
            ModelRole::MediatorAdjusted => &MEDIATOR_ADJUSTED,
            ModelRole::MediatorOmitted => &MEDIATOR_OMITTED,
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRole::MediatorAdjusted => f.write_str("model A (with mediator)"),
            ModelRole::MediatorOmitted => f.write_str("model B (without mediator)"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediationError {
    #[error("{model} failed to fit: {source}")]
    Regression {
        model: ModelRole,
        #[source]
        source: CoxError,
    },
    #[error("{model} did not converge after {iterations} iterations")]
    DidNotConverge { model: ModelRole, iterations: usize },
    #[error("{model} returned no exposure coefficient")]
    MissingExposure { model: ModelRole },
    #[error("total effect of the exposure is exactly zero; mediated proportion is undefined")]
    ZeroTotalEffect,
    #[error("mediated proportion is not finite (total {total}, direct {direct})")]
    NonFinite { total: f64, direct: f64 },
}

/// Direct and total exposure effects and the share of the total that runs through the mediator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediationResult {
    pub direct_effect: f64,
    pub total_effect: f64,
    pub mediated_proportion: f64,
}

impl MediationResult {
    /// `(total - direct) / total`; may be negative or exceed one.
    pub fn from_effects(total_effect: f64, direct_effect: f64) -> Result<Self, MediationError> {
        if total_effect == 0.0 {
            return Err(MediationError::ZeroTotalEffect);
        }
        let mediated_proportion = (total_effect - direct_effect) / total_effect;
        if !mediated_proportion.is_finite() {
            return Err(MediationError::NonFinite {
                total: total_effect,
                direct: direct_effect,
            });
        }
        Ok(Self {
            direct_effect,
            total_effect,
            mediated_proportion,
        })
    }
}

/// Both fitted models alongside the derived mediation result.
#[derive(Debug, Clone)]
pub struct MediationFits {
    pub mediator_adjusted: CoxFit,
    pub mediator_omitted: CoxFit,
    pub result: MediationResult,
}

fn fit_exposure<R: SurvivalRegression + ?Sized>(
    data: &SurvivalDataset,
    regression: &R,
    model: ModelRole,
) -> Result<(CoxFit, f64), MediationError> {
    let fit = regression
        .fit(data, model.covariates())
        .map_err(|source| MediationError::Regression { model, source })?;
    if !fit.converged() {
        return Err(MediationError::DidNotConverge {
            model,
            iterations: fit.iterations,
        });
    }
    let exposure = fit
        .coefficient(Covariate::Exposure)
        .ok_or(MediationError::MissingExposure { model })?;
    Ok((fit, exposure))
}

/// Fit both regressions and keep them for reporting.
pub fn estimate_mediation_fits<R: SurvivalRegression + ?Sized>(
    data: &SurvivalDataset,
    regression: &R,
) -> Result<MediationFits, MediationError> {
    let (mediator_adjusted, direct) = fit_exposure(data, regression, ModelRole::MediatorAdjusted)?;
    let (mediator_omitted, total) = fit_exposure(data, regression, ModelRole::MediatorOmitted)?;
    let result = MediationResult::from_effects(total, direct)?;
    Ok(MediationFits {
        mediator_adjusted,
        mediator_omitted,
        result,
    })
}

/// Proportion of the exposure's total log-hazard effect attributable to the mediator.
pub fn estimate_mediation<R: SurvivalRegression + ?Sized>(
    data: &SurvivalDataset,
    regression: &R,
) -> Result<MediationResult, MediationError> {
    estimate_mediation_fits(data, regression).map(|fits| fits.result)
}
