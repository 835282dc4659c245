use crate::bootstrap::{BootstrapConfig, BootstrapError};
use crate::cox::CoxOptions;
use crate::mediator::MediatorModel;
use crate::sampler::{CorrelatedSampler, SamplerError};
use crate::survival::{BaselineHazard, HazardSpec, SurvivalError};
use crate::types::{Covariate, UnknownCovariate};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Errors detected before any simulation starts. All are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("sample size must be positive")]
    EmptySample,
    #[error(transparent)]
    UnknownCovariate(#[from] UnknownCovariate),
    #[error("covariance row {row} has {found} entries but {expected} were expected")]
    RaggedCovariance {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("the correlated sampler must draw '{0}'")]
    MissingSampledCovariate(Covariate),
    #[error("the mediator is derived from the exposure and cannot be drawn by the sampler")]
    MediatorSampled,
    #[error("mediator weights must be finite")]
    InvalidMediatorWeights,
    #[error("regression needs at least one iteration and a finite positive tolerance")]
    InvalidRegressionOptions,
    #[error("invalid covariance specification: {0}")]
    Sampler(#[from] SamplerError),
    #[error("invalid hazard specification: {0}")]
    Survival(#[from] SurvivalError),
    #[error("invalid bootstrap settings: {0}")]
    Bootstrap(#[from] BootstrapError),
}

/// Mean and covariance of the jointly normal exposure and confounders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Row/column labels of the covariance matrix.
    pub names: Vec<String>,
    pub mean: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            names: vec![
                "exposure".to_string(),
                "confounder1".to_string(),
                "confounder2".to_string(),
            ],
            mean: vec![0.0, 0.0, 0.0],
            covariance: vec![
                vec![1.0, -0.3, -0.2],
                vec![-0.3, 1.0, 0.1],
                vec![-0.2, 0.1, 1.0],
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardConfig {
    pub baseline: BaselineHazard,
    /// Log-hazard coefficient by covariate name.
    pub coefficients: BTreeMap<String, f64>,
}

impl Default for HazardConfig {
    fn default() -> Self {
        let hazard = HazardSpec::default();
        Self {
            baseline: hazard.baseline,
            coefficients: hazard
                .coefficients
                .iter()
                .map(|&(c, beta)| (c.name().to_string(), beta))
                .collect(),
        }
    }
}

/// Every tunable constant of a simulation and bootstrap run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub sample_size: usize,
    /// Administrative censoring time.
    pub max_follow_up: f64,
    pub sampler: SamplerConfig,
    pub mediator: MediatorModel,
    pub hazard: HazardConfig,
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub regression: CoxOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 20240601,
            sample_size: 10_000,
            max_follow_up: 12.0,
            sampler: SamplerConfig::default(),
            mediator: MediatorModel::default(),
            hazard: HazardConfig::default(),
            bootstrap: BootstrapConfig::default(),
            regression: CoxOptions::default(),
        }
    }
}

/// Validated, ready-to-run form of a [`SimulationConfig`].
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub sample_size: usize,
    pub max_follow_up: f64,
    pub sampler: CorrelatedSampler,
    pub mediator: MediatorModel,
    pub hazard: HazardSpec,
    pub bootstrap: BootstrapConfig,
    pub regression: CoxOptions,
}

impl SimulationConfig {
    /// Saves the configuration in TOML format.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(self.to_toml()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a configuration from a TOML file. The result is not yet validated.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plan().map(|_| ())
    }

    /// Check every setting and build the sampler and hazard specification.
    pub fn plan(&self) -> Result<SimulationPlan, ConfigError> {
        if self.sample_size == 0 {
            return Err(ConfigError::EmptySample);
        }
        if !(self.mediator.exposure_weight.is_finite() && self.mediator.noise_weight.is_finite()) {
            return Err(ConfigError::InvalidMediatorWeights);
        }
        if self.regression.max_iterations == 0
            || !(self.regression.tolerance.is_finite() && self.regression.tolerance > 0.0)
        {
            return Err(ConfigError::InvalidRegressionOptions);
        }
        self.bootstrap.validate()?;
        if !(self.max_follow_up.is_finite() && self.max_follow_up > 0.0) {
            return Err(SurvivalError::InvalidFollowUp(self.max_follow_up).into());
        }

        let sampler = self.build_sampler()?;
        let hazard = self.build_hazard()?;

        Ok(SimulationPlan {
            sample_size: self.sample_size,
            max_follow_up: self.max_follow_up,
            sampler,
            mediator: self.mediator,
            hazard,
            bootstrap: self.bootstrap,
            regression: self.regression,
        })
    }

    fn build_sampler(&self) -> Result<CorrelatedSampler, ConfigError> {
        let names = self
            .sampler
            .names
            .iter()
            .map(|n| n.parse::<Covariate>())
            .collect::<Result<Vec<_>, _>>()?;
        if names.contains(&Covariate::Mediator) {
            return Err(ConfigError::MediatorSampled);
        }
        for required in [
            Covariate::Exposure,
            Covariate::Confounder1,
            Covariate::Confounder2,
        ] {
            if !names.contains(&required) {
                return Err(ConfigError::MissingSampledCovariate(required));
            }
        }

        let dim = self.sampler.covariance.len();
        let mut covariance = Array2::zeros((dim, dim));
        for (i, row) in self.sampler.covariance.iter().enumerate() {
            if row.len() != dim {
                return Err(ConfigError::RaggedCovariance {
                    row: i,
                    expected: dim,
                    found: row.len(),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                covariance[(i, j)] = v;
            }
        }

        Ok(CorrelatedSampler::new(
            names,
            Array1::from_vec(self.sampler.mean.clone()),
            covariance,
        )?)
    }

    fn build_hazard(&self) -> Result<HazardSpec, ConfigError> {
        let coefficients = self
            .hazard
            .coefficients
            .iter()
            .map(|(name, &beta)| Ok((name.parse::<Covariate>()?, beta)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let hazard = HazardSpec {
            baseline: self.hazard.baseline,
            coefficients,
        };
        hazard.validate()?;
        Ok(hazard)
    }
}
