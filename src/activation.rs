//! Activation Functions
//!
//! The recurrent layer applies one elementwise nonlinearity to every
//! pre-activation vector it produces. The available functions form a small
//! closed set, chosen once at configuration time.
//!
//! ## Derivatives from Outputs
//!
//! Backpropagation-through-time never keeps the pre-activation values
//! around; only the post-activation hidden states are stored in the
//! training context. Every function here therefore exposes its derivative
//! *in terms of the output* `y = f(z)`:
//!
//! ```text
//! identity:  f'(z) = 1
//! sigmoid:   f'(z) = y (1 - y)
//! tanh:      f'(z) = 1 - y²
//! relu:      f'(z) = 1 if y > 0 else 0
//! ```
//!
//! This is what lets the backward walk evaluate `f'` directly on the cached
//! hidden states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Elementwise activation function applied to each hidden-state vector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// No nonlinearity: `f(z) = z`
    Identity,
    /// Logistic sigmoid: `f(z) = 1 / (1 + e^-z)`
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Rectified linear unit: `f(z) = max(0, z)`
    Relu,
}

impl Activation {
    /// Apply the function to one pre-activation value
    #[inline]
    pub fn forward(self, z: f32) -> f32 {
        match self {
            Activation::Identity => z,
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Tanh => z.tanh(),
            Activation::Relu => z.max(0.0),
        }
    }

    /// Derivative of the function, evaluated from the post-activation output
    ///
    /// `y` must be a value previously produced by [`forward`](Self::forward).
    #[inline]
    pub fn derivative(self, y: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Identity => "identity",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
        };
        write!(f, "{}", name)
    }
}
