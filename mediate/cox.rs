use crate::faer_ndarray::FaerCholesky;
use crate::types::{Covariate, SurvivalDataset};
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use thiserror::Error;

/// Maximum number of times a Newton step is halved before giving up.
const MAX_STEP_HALVINGS: usize = 12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoxError {
    #[error("cannot fit a proportional hazards model to an empty dataset")]
    EmptyDataset,
    #[error("dataset contains no observed events")]
    NoEvents,
    #[error("at least one covariate is required")]
    NoCovariates,
    #[error("covariate '{0}' was requested more than once")]
    DuplicateCovariate(Covariate),
    #[error("partial log-likelihood became non-finite at iteration {iteration}")]
    NonFiniteLikelihood { iteration: usize },
    #[error(
        "information matrix is not positive definite at iteration {iteration}; covariates may be collinear"
    )]
    SingularInformation { iteration: usize },
    #[error("step halving failed to increase the partial likelihood at iteration {iteration}")]
    StepHalvingFailed { iteration: usize },
}

/// Convergence state of a proportional hazards fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoxStatus {
    /// Relative change in the partial log-likelihood fell below tolerance.
    Converged,
    /// Iteration budget exhausted before the tolerance was met.
    MaxIterationsReached,
}

/// Fitted coefficients of a proportional hazards regression.
#[derive(Debug, Clone, PartialEq)]
pub struct CoxFit {
    /// Covariates in the order they were requested.
    pub covariates: Vec<Covariate>,
    /// Log hazard ratios, one per covariate.
    pub coefficients: Array1<f64>,
    pub standard_errors: Array1<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: usize,
    pub status: CoxStatus,
}

impl CoxFit {
    pub fn converged(&self) -> bool {
        self.status == CoxStatus::Converged
    }

    pub fn coefficient(&self, covariate: Covariate) -> Option<f64> {
        self.covariates
            .iter()
            .position(|&c| c == covariate)
            .map(|j| self.coefficients[j])
    }
}

/// Proportional hazards regression: one coefficient per covariate plus a convergence flag.
pub trait SurvivalRegression {
    fn fit(&self, data: &SurvivalDataset, covariates: &[Covariate]) -> Result<CoxFit, CoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoxOptions {
    pub max_iterations: usize,
    /// Convergence threshold on `|1 - ll_old / ll_new|`.
    pub tolerance: f64,
}

impl Default for CoxOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-9,
        }
    }
}

/// Newton-Raphson maximiser of the Breslow partial likelihood.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonCox {
    pub options: CoxOptions,
}

impl NewtonCox {
    pub fn new(options: CoxOptions) -> Self {
        Self { options }
    }
}

impl SurvivalRegression for NewtonCox {
    fn fit(&self, data: &SurvivalDataset, covariates: &[Covariate]) -> Result<CoxFit, CoxError> {
        if data.is_empty() {
            return Err(CoxError::EmptyDataset);
        }
        if covariates.is_empty() {
            return Err(CoxError::NoCovariates);
        }
        for (idx, &c) in covariates.iter().enumerate() {
            if covariates[..idx].contains(&c) {
                return Err(CoxError::DuplicateCovariate(c));
            }
        }
        if data.event_count() == 0 {
            return Err(CoxError::NoEvents);
        }

        let likelihood = PartialLikelihood::new(data, covariates);
        let p = covariates.len();
        let mut beta = Array1::<f64>::zeros(p);
        let mut state = likelihood.evaluate(beta.view(), 0)?;
        let null_log_likelihood = state.log_likelihood;
        let mut status = CoxStatus::MaxIterationsReached;
        let mut iterations = 0;

        for iteration in 1..=self.options.max_iterations {
            iterations = iteration;
            let factor = state
                .information
                .cholesky(Side::Lower)
                .map_err(|_| CoxError::SingularInformation { iteration })?;
            let mut step = factor.solve_vec(&state.gradient);

            let mut halvings = 0;
            let (trial_beta, trial) = loop {
                let candidate = &beta + &step;
                match likelihood.evaluate(candidate.view(), iteration) {
                    Ok(trial) if trial.log_likelihood >= state.log_likelihood => {
                        break (candidate, trial);
                    }
                    Ok(_) | Err(CoxError::NonFiniteLikelihood { .. })
                        if halvings < MAX_STEP_HALVINGS =>
                    {
                        halvings += 1;
                        step.mapv_inplace(|v| 0.5 * v);
                    }
                    Ok(_) => return Err(CoxError::StepHalvingFailed { iteration }),
                    Err(e) => return Err(e),
                }
            };
            if halvings > 0 {
                log::debug!("Cox iteration {iteration}: step halved {halvings} times");
            }

            let relative_change = (1.0 - state.log_likelihood / trial.log_likelihood).abs();
            log::debug!(
                "Cox iteration {}: loglik {:.8} -> {:.8} (relative change {:.3e})",
                iteration,
                state.log_likelihood,
                trial.log_likelihood,
                relative_change
            );
            beta = trial_beta;
            state = trial;

            if relative_change <= self.options.tolerance {
                status = CoxStatus::Converged;
                break;
            }
        }

        let covariance = state
            .information
            .cholesky(Side::Lower)
            .map_err(|_| CoxError::SingularInformation { iteration: iterations })?
            .inverse(p);
        let standard_errors = covariance.diag().mapv(|v| v.max(0.0).sqrt());

        if status == CoxStatus::MaxIterationsReached {
            log::debug!(
                "Cox fit on {:?} did not converge within {} iterations",
                covariates,
                self.options.max_iterations
            );
        }

        Ok(CoxFit {
            covariates: covariates.to_vec(),
            coefficients: beta,
            standard_errors,
            log_likelihood: state.log_likelihood,
            null_log_likelihood,
            iterations,
            status,
        })
    }
}

/// Value, score and observed information of the partial log-likelihood.
struct CoxState {
    log_likelihood: f64,
    gradient: Array1<f64>,
    information: Array2<f64>,
}

/// Risk-set bookkeeping for the Breslow partial likelihood.
///
/// Rows are visited in order of decreasing time so that the risk set of each
/// event is accumulated incrementally. Rows sharing a time enter the risk set
/// together before any of their events contribute.
struct PartialLikelihood<'a> {
    design: Array2<f64>,
    status: ArrayView1<'a, bool>,
    order: Vec<usize>,
    tied_groups: Vec<Range<usize>>,
}

impl<'a> PartialLikelihood<'a> {
    fn new(data: &'a SurvivalDataset, covariates: &[Covariate]) -> Self {
        let mut design = data.covariates.design(covariates);
        if let Some(means) = design.mean_axis(Axis(0)) {
            design -= &means;
        }

        let time = &data.event_time;
        let mut order: Vec<usize> = (0..data.len()).collect();
        order.sort_by(|&a, &b| time[b].partial_cmp(&time[a]).unwrap_or(Ordering::Equal));

        let mut tied_groups = Vec::new();
        let mut start = 0;
        for pos in 1..=order.len() {
            if pos == order.len() || time[order[pos]] != time[order[start]] {
                tied_groups.push(start..pos);
                start = pos;
            }
        }

        Self {
            design,
            status: data.status.view(),
            order,
            tied_groups,
        }
    }

    fn evaluate(&self, beta: ArrayView1<'_, f64>, iteration: usize) -> Result<CoxState, CoxError> {
        let p = beta.len();
        let eta = self.design.dot(&beta);
        let shift = eta.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !shift.is_finite() {
            return Err(CoxError::NonFiniteLikelihood { iteration });
        }

        let mut s0 = 0.0;
        let mut s1 = Array1::<f64>::zeros(p);
        let mut s2 = Array2::<f64>::zeros((p, p));
        let mut log_likelihood = 0.0;
        let mut gradient = Array1::<f64>::zeros(p);
        let mut information = Array2::<f64>::zeros((p, p));

        for group in &self.tied_groups {
            let rows = &self.order[group.clone()];
            let mut events = 0usize;
            for &i in rows {
                let x = self.design.row(i);
                let w = (eta[i] - shift).exp();
                s0 += w;
                s1.scaled_add(w, &x);
                for a in 0..p {
                    let wa = w * x[a];
                    for b in 0..=a {
                        s2[(a, b)] += wa * x[b];
                    }
                }
                if self.status[i] {
                    events += 1;
                    log_likelihood += eta[i];
                    gradient += &x;
                }
            }
            if events == 0 {
                continue;
            }

            let d = events as f64;
            let mean = &s1 / s0;
            log_likelihood -= d * (s0.ln() + shift);
            gradient.scaled_add(-d, &mean);
            for a in 0..p {
                for b in 0..=a {
                    let v = d * (s2[(a, b)] / s0 - mean[a] * mean[b]);
                    information[(a, b)] += v;
                    if a != b {
                        information[(b, a)] += v;
                    }
                }
            }
        }

        if !log_likelihood.is_finite() || !gradient.iter().all(|g| g.is_finite()) {
            return Err(CoxError::NonFiniteLikelihood { iteration });
        }

        Ok(CoxState {
            log_likelihood,
            gradient,
            information,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::SurvivalDatasetBuilder;
    use crate::types::CovariateTable;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn tiny_dataset() -> SurvivalDataset {
        let table = CovariateTable::new(
            array![0.0, 1.0, 0.0, 1.0],
            array![0.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        SurvivalDataset::new(table, array![1.0, 2.0, 3.0, 4.0], array![true, true, true, false])
            .unwrap()
    }

    #[test]
    fn score_and_information_match_hand_computation_at_zero() {
        let data = tiny_dataset();
        let likelihood = PartialLikelihood::new(&data, &[Covariate::Exposure]);
        let state = likelihood.evaluate(array![0.0].view(), 0).unwrap();

        // Centered exposure is +-0.5; risk sets at t = 1, 2, 3 have sizes 4, 3, 2.
        let expected_ll = -(4.0_f64.ln() + 3.0_f64.ln() + 2.0_f64.ln());
        assert_abs_diff_eq!(state.log_likelihood, expected_ll, epsilon = 1e-12);

        // Score: sum over events of x_i - mean(risk set).
        let g = (-0.5 - 0.0) + (0.5 - 1.0 / 6.0) + (-0.5 - 0.0);
        assert_abs_diff_eq!(state.gradient[0], g, epsilon = 1e-12);

        // Information: risk-set variances 0.25, 2/9, 0.25.
        let info = 0.25 + (0.25 - 1.0 / 36.0) + 0.25;
        assert_abs_diff_eq!(state.information[(0, 0)], info, epsilon = 1e-12);
    }

    #[test]
    fn newton_recovers_simulated_coefficients() {
        let data = SurvivalDatasetBuilder::new(8_000).seed(17).build();
        let covariates = [
            Covariate::Exposure,
            Covariate::Mediator,
            Covariate::Confounder1,
            Covariate::Confounder2,
        ];
        let fit = NewtonCox::default().fit(&data, &covariates).unwrap();
        assert!(fit.converged());
        assert!(fit.iterations < 15);
        assert!(fit.log_likelihood > fit.null_log_likelihood);

        let truth = [0.4, -0.3, -0.1, -0.3];
        for (j, &beta) in truth.iter().enumerate() {
            let se = fit.standard_errors[j];
            assert!(se > 0.0 && se < 0.1);
            assert!(
                (fit.coefficients[j] - beta).abs() < 4.0 * se,
                "{}: estimate {} vs truth {} (se {})",
                covariates[j],
                fit.coefficients[j],
                beta,
                se
            );
        }
        assert_eq!(fit.coefficient(Covariate::Mediator), Some(fit.coefficients[1]));
    }

    #[test]
    fn reports_max_iterations_when_budget_is_exhausted() {
        let data = SurvivalDatasetBuilder::new(500).seed(2).build();
        let solver = NewtonCox::new(CoxOptions {
            max_iterations: 1,
            tolerance: 1e-12,
        });
        let fit = solver.fit(&data, &[Covariate::Exposure]).unwrap();
        assert_eq!(fit.status, CoxStatus::MaxIterationsReached);
        assert!(!fit.converged());
        assert_eq!(fit.iterations, 1);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let data = tiny_dataset();
        let solver = NewtonCox::default();
        assert_eq!(solver.fit(&data, &[]), Err(CoxError::NoCovariates));
        assert_eq!(
            solver.fit(&data, &[Covariate::Exposure, Covariate::Exposure]),
            Err(CoxError::DuplicateCovariate(Covariate::Exposure))
        );

        let censored = SurvivalDataset::new(
            data.covariates.clone(),
            data.event_time.clone(),
            Array1::from_elem(4, false),
        )
        .unwrap();
        assert_eq!(
            solver.fit(&censored, &[Covariate::Exposure]),
            Err(CoxError::NoEvents)
        );

        // Confounder columns are constant, so the information matrix is singular.
        assert!(matches!(
            solver.fit(&data, &[Covariate::Confounder1]),
            Err(CoxError::SingularInformation { iteration: 1 })
        ));
    }
}
