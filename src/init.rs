//! Weight Initialization Policies
//!
//! The layer's two weight matrices are filled exactly once, at construction,
//! by a pluggable initializer. The policy receives the layer's flattened
//! input and output sizes as fan hints, so scale-sensitive schemes (Xavier,
//! He) can adapt to the layer's geometry.
//!
//! All randomness flows through a caller-seeded [`StdRng`], which keeps
//! construction reproducible: the same seed always produces the same
//! weights.
//!
//! ## Policies
//!
//! - `Zero` — all weights zero (useful for tests and embeddings of fixed values)
//! - `Uniform { low, high }` — independent uniform draws
//! - `Normal { mean, std_dev }` — independent Gaussian draws; the default is
//!   zero-mean, unit-variance
//! - `Xavier` — Gaussian with `std = √(2 / (fan_in + fan_out))`
//! - `He` — Gaussian with `std = √(2 / fan_in)`

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Weight initialization policy, selected once at layer configuration time
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Init {
    /// All weights zero
    Zero,
    /// Independent draws from `U(low, high)`
    Uniform { low: f32, high: f32 },
    /// Independent draws from `N(mean, std_dev²)`
    Normal { mean: f32, std_dev: f32 },
    /// Gaussian draws scaled by `√(2 / (fan_in + fan_out))`
    Xavier,
    /// Gaussian draws scaled by `√(2 / fan_in)`
    He,
}

impl Default for Init {
    /// Zero-mean, unit-variance Gaussian
    fn default() -> Self {
        Init::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl Init {
    /// Fill a `rows x cols` weight matrix according to this policy
    ///
    /// # Arguments
    ///
    /// * `rows`, `cols` - Shape of the matrix to create
    /// * `fan_in` - The layer's flattened input size (scale hint)
    /// * `fan_out` - The layer's flattened output size (scale hint)
    /// * `rng` - Seeded generator; draws advance its state
    ///
    /// # Panics
    ///
    /// Panics if a `Uniform` policy has `low >= high` or a `Normal` policy
    /// has a non-finite or negative standard deviation.
    pub fn initialize(
        &self,
        rows: usize,
        cols: usize,
        fan_in: usize,
        fan_out: usize,
        rng: &mut StdRng,
    ) -> Tensor {
        let size = rows * cols;
        let data: Vec<f32> = match *self {
            Init::Zero => vec![0.0; size],
            Init::Uniform { low, high } => {
                assert!(
                    low < high,
                    "Uniform init requires low < high, got [{}, {})",
                    low,
                    high
                );
                let dist = Uniform::new(low, high);
                (0..size).map(|_| dist.sample(rng)).collect()
            }
            Init::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev)
                    .expect("Normal init requires a finite, non-negative std_dev");
                (0..size).map(|_| dist.sample(rng)).collect()
            }
            Init::Xavier => {
                let std_dev = (2.0 / (fan_in + fan_out) as f32).sqrt();
                let dist = Normal::new(0.0, std_dev)
                    .expect("Xavier init produced an invalid std_dev");
                (0..size).map(|_| dist.sample(rng)).collect()
            }
            Init::He => {
                let std_dev = (2.0 / fan_in as f32).sqrt();
                let dist =
                    Normal::new(0.0, std_dev).expect("He init produced an invalid std_dev");
                (0..size).map(|_| dist.sample(rng)).collect()
            }
        };

        Tensor::new(data, vec![rows, cols])
    }
}
