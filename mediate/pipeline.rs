use crate::bootstrap::{BootstrapError, BootstrapSummary, run_bootstrap};
use crate::config::{ConfigError, SimulationConfig, SimulationPlan};
use crate::cox::{NewtonCox, SurvivalRegression};
use crate::sampler::SamplerError;
use crate::seeding::{RngStreams, Stream};
use crate::survival::{SimulatedCohort, SurvivalError, simulate_survival};
use crate::types::{Covariate, CovariateTable, TableError};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("sampling failed: {0}")]
    Sampler(#[from] SamplerError),
    #[error("survival simulation failed: {0}")]
    Survival(#[from] SurvivalError),
    #[error("covariate table is inconsistent: {0}")]
    Table(#[from] TableError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Simulated population and the bootstrap summary computed from it.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub cohort: SimulatedCohort,
    pub summary: BootstrapSummary,
}

/// Draw the exposure and confounders, derive the mediator, and simulate outcomes.
pub fn simulate_population(
    plan: &SimulationPlan,
    streams: &RngStreams,
) -> Result<SimulatedCohort, PipelineError> {
    let draws = plan
        .sampler
        .sample(plan.sample_size, &mut streams.stream(Stream::Sampler))?;
    let column = |covariate: Covariate| {
        draws
            .column(covariate)
            .map(|view| view.to_owned())
            .ok_or(ConfigError::MissingSampledCovariate(covariate))
    };
    let exposure = column(Covariate::Exposure)?;
    let confounder1 = column(Covariate::Confounder1)?;
    let confounder2 = column(Covariate::Confounder2)?;

    let mediator = plan
        .mediator
        .generate(exposure.view(), &mut streams.stream(Stream::MediatorNoise));
    let table = CovariateTable::new(exposure, confounder1, confounder2, mediator)?;

    Ok(simulate_survival(
        table,
        &plan.hazard,
        plan.max_follow_up,
        &mut streams.stream(Stream::EventTimes),
    )?)
}

/// Run the full simulation and bootstrap with a caller-supplied regression.
pub fn run_analysis_with<R: SurvivalRegression + ?Sized>(
    config: &SimulationConfig,
    regression: &R,
) -> Result<AnalysisReport, PipelineError> {
    let plan = config.plan()?;
    let streams = RngStreams::new(config.seed);
    log::info!(
        "Simulating {} individuals (seed {}, follow-up {})",
        plan.sample_size,
        streams.master(),
        plan.max_follow_up
    );

    let start = Instant::now();
    let cohort = simulate_population(&plan, &streams)?;
    let summary = run_bootstrap(&cohort.dataset, regression, &plan.bootstrap, &streams)?;
    log::info!("Analysis finished in {:.2?}", start.elapsed());

    Ok(AnalysisReport { cohort, summary })
}

/// Run the full simulation and bootstrap with the Newton-Raphson Cox fitter.
pub fn run_analysis(config: &SimulationConfig) -> Result<AnalysisReport, PipelineError> {
    let regression = NewtonCox::new(config.regression);
    run_analysis_with(config, &regression)
}
