use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Linear mediator model: `mediator = exposure_weight * exposure + noise_weight * e`
/// with `e ~ N(0, 1)` drawn independently of the covariate draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediatorModel {
    pub exposure_weight: f64,
    pub noise_weight: f64,
}

impl Default for MediatorModel {
    fn default() -> Self {
        Self {
            exposure_weight: -(0.5_f64).sqrt(),
            noise_weight: (0.8_f64).sqrt(),
        }
    }
}

impl MediatorModel {
    pub fn generate<R: Rng>(&self, exposure: ArrayView1<'_, f64>, rng: &mut R) -> Array1<f64> {
        exposure.mapv(|x| {
            let noise: f64 = rng.sample(StandardNormal);
            self.exposure_weight * x + self.noise_weight * noise
        })
    }
}
