use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The named covariate columns carried by every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Covariate {
    Exposure,
    Mediator,
    Confounder1,
    Confounder2,
}

impl Covariate {
    pub const ALL: [Covariate; 4] = [
        Covariate::Exposure,
        Covariate::Mediator,
        Covariate::Confounder1,
        Covariate::Confounder2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Covariate::Exposure => "exposure",
            Covariate::Mediator => "mediator",
            Covariate::Confounder1 => "confounder1",
            Covariate::Confounder2 => "confounder2",
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown covariate '{0}' (expected one of exposure, mediator, confounder1, confounder2)")]
pub struct UnknownCovariate(pub String);

impl FromStr for Covariate {
    type Err = UnknownCovariate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Covariate::ALL
            .into_iter()
            .find(|c| c.name() == lowered)
            .ok_or_else(|| UnknownCovariate(s.to_string()))
    }
}

/// Errors raised when assembling tables from column arrays.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{column}' has {found} rows but {expected} were expected")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("column '{0}' contains non-finite values")]
    NonFinite(String),
    #[error("event times must be finite and strictly positive")]
    InvalidEventTime,
}

/// Columnar covariate storage, one entry per simulated individual.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateTable {
    pub id: Array1<usize>,
    pub exposure: Array1<f64>,
    pub confounder1: Array1<f64>,
    pub confounder2: Array1<f64>,
    pub mediator: Array1<f64>,
}

impl CovariateTable {
    /// Assemble a table from owned columns. Ids are assigned sequentially from 1.
    pub fn new(
        exposure: Array1<f64>,
        confounder1: Array1<f64>,
        confounder2: Array1<f64>,
        mediator: Array1<f64>,
    ) -> Result<Self, TableError> {
        let n = exposure.len();
        for (covariate, column) in [
            (Covariate::Exposure, &exposure),
            (Covariate::Confounder1, &confounder1),
            (Covariate::Confounder2, &confounder2),
            (Covariate::Mediator, &mediator),
        ] {
            if column.len() != n {
                return Err(TableError::LengthMismatch {
                    column: covariate.name().to_string(),
                    expected: n,
                    found: column.len(),
                });
            }
            if !column.iter().all(|v| v.is_finite()) {
                return Err(TableError::NonFinite(covariate.name().to_string()));
            }
        }
        Ok(Self {
            id: sequential_ids(n),
            exposure,
            confounder1,
            confounder2,
            mediator,
        })
    }

    pub fn len(&self) -> usize {
        self.exposure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposure.is_empty()
    }

    pub fn column(&self, covariate: Covariate) -> ArrayView1<'_, f64> {
        match covariate {
            Covariate::Exposure => self.exposure.view(),
            Covariate::Mediator => self.mediator.view(),
            Covariate::Confounder1 => self.confounder1.view(),
            Covariate::Confounder2 => self.confounder2.view(),
        }
    }

    /// Stack the requested covariates into an `n x k` design matrix in request order.
    pub fn design(&self, covariates: &[Covariate]) -> Array2<f64> {
        let mut design = Array2::zeros((self.len(), covariates.len()));
        for (j, &covariate) in covariates.iter().enumerate() {
            design.column_mut(j).assign(&self.column(covariate));
        }
        design
    }

    fn select(&self, rows: &[usize]) -> Self {
        let pick = |col: &Array1<f64>| Array1::from_iter(rows.iter().map(|&r| col[r]));
        Self {
            id: sequential_ids(rows.len()),
            exposure: pick(&self.exposure),
            confounder1: pick(&self.confounder1),
            confounder2: pick(&self.confounder2),
            mediator: pick(&self.mediator),
        }
    }
}

/// Covariates plus the simulated (or observed) right-censored outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalDataset {
    pub covariates: CovariateTable,
    pub event_time: Array1<f64>,
    /// `true` when the event was observed, `false` when censored at follow-up end.
    pub status: Array1<bool>,
}

impl SurvivalDataset {
    pub fn new(
        covariates: CovariateTable,
        event_time: Array1<f64>,
        status: Array1<bool>,
    ) -> Result<Self, TableError> {
        let n = covariates.len();
        if event_time.len() != n {
            return Err(TableError::LengthMismatch {
                column: "eventtime".to_string(),
                expected: n,
                found: event_time.len(),
            });
        }
        if status.len() != n {
            return Err(TableError::LengthMismatch {
                column: "status".to_string(),
                expected: n,
                found: status.len(),
            });
        }
        if !event_time.iter().all(|&t| t.is_finite() && t > 0.0) {
            return Err(TableError::InvalidEventTime);
        }
        Ok(Self {
            covariates,
            event_time,
            status,
        })
    }

    pub fn len(&self) -> usize {
        self.covariates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariates.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.status.iter().filter(|&&s| s).count()
    }

    /// Build a dataset from the given row indices (repeats allowed), renumbering ids from 1.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            covariates: self.covariates.select(rows),
            event_time: Array1::from_iter(rows.iter().map(|&r| self.event_time[r])),
            status: Array1::from_iter(rows.iter().map(|&r| self.status[r])),
        }
    }
}

fn sequential_ids(n: usize) -> Array1<usize> {
    Array1::from_iter(1..=n)
}
