use crate::faer_ndarray::{FaerCholesky, FaerEigh, FaerLinalgError};
use crate::types::Covariate;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::HashSet;
use thiserror::Error;

/// Relative tolerance used for symmetry and semi-definiteness checks.
const MATRIX_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("covariance matrix must be square, found {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("mean vector has length {mean} but the covariance matrix is {dim}x{dim}")]
    MeanDimensionMismatch { mean: usize, dim: usize },
    #[error("{names} covariate names were given for a {dim}x{dim} covariance matrix")]
    NameDimensionMismatch { names: usize, dim: usize },
    #[error("covariate '{0}' appears more than once in the covariance labels")]
    DuplicateName(Covariate),
    #[error("mean vector and covariance matrix must contain only finite values")]
    NonFinite,
    #[error("covariance matrix is not symmetric at ({row}, {col})")]
    NotSymmetric { row: usize, col: usize },
    #[error("covariance matrix is not positive semi-definite (smallest eigenvalue {min_eigenvalue:.3e})")]
    NotPositiveSemiDefinite { min_eigenvalue: f64 },
    #[error("sample size must be positive")]
    EmptySample,
    #[error("linear algebra failure: {0}")]
    Linalg(#[from] FaerLinalgError),
}

/// Draws labelled from a [`CorrelatedSampler`], one column per covariate.
#[derive(Debug, Clone)]
pub struct NamedDraws {
    pub names: Vec<Covariate>,
    pub values: Array2<f64>,
}

impl NamedDraws {
    pub fn column(&self, covariate: Covariate) -> Option<ArrayView1<'_, f64>> {
        self.names
            .iter()
            .position(|&c| c == covariate)
            .map(|j| self.values.column(j))
    }
}

/// Multivariate normal sampler with a fixed mean and covariance.
///
/// The covariance is factored once at construction: Cholesky when it is
/// positive definite, an eigen square root when it is only semi-definite.
#[derive(Debug, Clone)]
pub struct CorrelatedSampler {
    names: Vec<Covariate>,
    mean: Array1<f64>,
    factor: Array2<f64>,
}

impl CorrelatedSampler {
    pub fn new(
        names: Vec<Covariate>,
        mean: Array1<f64>,
        covariance: Array2<f64>,
    ) -> Result<Self, SamplerError> {
        let (rows, cols) = covariance.dim();
        if rows != cols {
            return Err(SamplerError::NotSquare { rows, cols });
        }
        if mean.len() != rows {
            return Err(SamplerError::MeanDimensionMismatch {
                mean: mean.len(),
                dim: rows,
            });
        }
        if names.len() != rows {
            return Err(SamplerError::NameDimensionMismatch {
                names: names.len(),
                dim: rows,
            });
        }
        let mut seen = HashSet::new();
        for &name in &names {
            if !seen.insert(name) {
                return Err(SamplerError::DuplicateName(name));
            }
        }
        if !mean.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            return Err(SamplerError::NonFinite);
        }

        let scale = covariance
            .diag()
            .iter()
            .fold(1.0_f64, |acc, &v| acc.max(v.abs()));
        for i in 0..rows {
            for j in (i + 1)..rows {
                if (covariance[(i, j)] - covariance[(j, i)]).abs() > MATRIX_TOLERANCE * scale {
                    return Err(SamplerError::NotSymmetric { row: i, col: j });
                }
            }
        }

        let factor = match covariance.cholesky(Side::Lower) {
            Ok(llt) => llt.lower(),
            Err(_) => semidefinite_root(&covariance, scale)?,
        };

        Ok(Self {
            names,
            mean,
            factor,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn names(&self) -> &[Covariate] {
        &self.names
    }

    /// Draw `n` independent vectors; row `i` of the result is draw `i`.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<NamedDraws, SamplerError> {
        if n == 0 {
            return Err(SamplerError::EmptySample);
        }
        let k = self.dim();
        let z = Array2::from_shape_fn((n, k), |_| rng.sample::<f64, _>(StandardNormal));
        let mut values = z.dot(&self.factor.t());
        values += &self.mean;
        Ok(NamedDraws {
            names: self.names.clone(),
            values,
        })
    }
}

fn semidefinite_root(covariance: &Array2<f64>, scale: f64) -> Result<Array2<f64>, SamplerError> {
    let (values, vectors) = covariance.eigh(Side::Lower)?;
    let min_eigenvalue = values.iter().cloned().fold(f64::INFINITY, f64::min);
    if min_eigenvalue < -MATRIX_TOLERANCE * scale {
        return Err(SamplerError::NotPositiveSemiDefinite { min_eigenvalue });
    }
    log::debug!(
        "Covariance is singular (smallest eigenvalue {min_eigenvalue:.3e}); using eigen square root"
    );
    let roots = values.mapv(|v| v.max(0.0).sqrt());
    Ok(&vectors * &roots)
}
