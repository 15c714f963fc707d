//! Layer Configuration
//!
//! The recurrent layer's geometry is fixed once, at construction, and never
//! varies afterwards:
//!
//! - `time_steps` (T): positions in every input/output sequence
//! - `sequence_length` (S): input feature count per step
//! - `hidden_units` (H): hidden-state width per step
//!
//! Alongside the dimensions, the configuration carries the activation
//! function, the weight-initializer policy, and the BPTT truncation bound
//! (the number of steps the backward recursion walks before stopping).
//!
//! All invariants are validated here, once; every downstream kernel may
//! assume a well-formed configuration.

use crate::activation::Activation;
use crate::init::Init;
use serde::{Deserialize, Serialize};

/// Immutable configuration of one recurrent layer
///
/// # Example
///
/// ```rust
/// use tbptt::{Activation, RnnConfig};
///
/// let config = RnnConfig::new(8, 3, 16)
///     .with_activation(Activation::Sigmoid)
///     .with_truncate(4);
///
/// assert_eq!(config.input_size(), 24);   // T * S
/// assert_eq!(config.output_size(), 128); // T * H
/// assert_eq!(config.parameters(), 304);  // H*H + H*S
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RnnConfig {
    /// Number of time steps T in every sequence
    pub time_steps: usize,
    /// Input features S per time step
    pub sequence_length: usize,
    /// Hidden units H per time step
    pub hidden_units: usize,
    /// Elementwise nonlinearity applied to every hidden state
    pub activation: Activation,
    /// Number of steps the backward recursion walks (1..=T); T means no
    /// truncation
    pub truncate: usize,
    /// Weight initialization policy, invoked once per weight matrix
    pub init: Init,
}

impl RnnConfig {
    /// Create a configuration with tanh activation, full-length BPTT, and
    /// the default (unit Gaussian) initializer
    ///
    /// # Panics
    ///
    /// Panics if any dimension is zero.
    pub fn new(time_steps: usize, sequence_length: usize, hidden_units: usize) -> Self {
        assert!(time_steps > 0, "time_steps must be positive");
        assert!(sequence_length > 0, "sequence_length must be positive");
        assert!(hidden_units > 0, "hidden_units must be positive");

        Self {
            time_steps,
            sequence_length,
            hidden_units,
            activation: Activation::Tanh,
            truncate: time_steps,
            init: Init::default(),
        }
    }

    /// Select the activation function
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Bound the backward recursion to `truncate` steps
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= truncate <= time_steps`.
    pub fn with_truncate(mut self, truncate: usize) -> Self {
        assert!(
            truncate >= 1 && truncate <= self.time_steps,
            "truncate must be in 1..={}, got {}",
            self.time_steps,
            truncate
        );
        self.truncate = truncate;
        self
    }

    /// Select the weight initialization policy
    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    /// Flattened input size: `T * S`
    pub fn input_size(&self) -> usize {
        self.time_steps * self.sequence_length
    }

    /// Flattened output size: `T * H`
    pub fn output_size(&self) -> usize {
        self.time_steps * self.hidden_units
    }

    /// Number of trainable parameters: `H*H + H*S`
    pub fn parameters(&self) -> usize {
        self.hidden_units * self.hidden_units + self.hidden_units * self.sequence_length
    }
}
