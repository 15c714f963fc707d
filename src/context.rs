//! Per-Mini-Batch Training Context
//!
//! The training loop owns one `TrainingContext` per mini-batch and threads
//! it through the layer's phases:
//!
//! 1. The forward pass fills `output` from `input`
//! 2. The loss (or the next layer) writes the error signal into `errors`;
//!    for the last layer only the final time step is populated
//! 3. The gradient engine reads all three buffers and fills `w_grad` /
//!    `u_grad`
//! 4. The optimizer consumes the gradients and updates the layer's weights
//!
//! All buffers are sized once from the batch size and the layer
//! configuration; every shape downstream kernels rely on is established
//! here.

use crate::config::RnnConfig;
use crate::tensor::Tensor;

/// Scratch buffers for one mini-batch of training
///
/// # Fields
///
/// - `input`: `[batch, T, S]` — the batch's inputs, kept for the gradient
///   computation
/// - `output`: `[batch, T, H]` — hidden states from the forward pass
/// - `errors`: `[batch, T, H]` — loss gradient w.r.t. the outputs
/// - `w_grad`: `[H, H]` — batch-summed gradient for the recurrent weights
/// - `u_grad`: `[H, S]` — batch-summed gradient for the input weights
pub struct TrainingContext {
    pub input: Tensor,
    pub output: Tensor,
    pub errors: Tensor,
    pub w_grad: Tensor,
    pub u_grad: Tensor,
}

impl TrainingContext {
    /// Allocate zeroed buffers for `batch` samples of the given layer shape
    ///
    /// # Panics
    ///
    /// Panics if `batch` is zero.
    pub fn new(batch: usize, config: &RnnConfig) -> Self {
        assert!(batch > 0, "batch size must be positive");

        let t = config.time_steps;
        let s = config.sequence_length;
        let h = config.hidden_units;

        Self {
            input: Tensor::zeros(vec![batch, t, s]),
            output: Tensor::zeros(vec![batch, t, h]),
            errors: Tensor::zeros(vec![batch, t, h]),
            w_grad: Tensor::zeros(vec![h, h]),
            u_grad: Tensor::zeros(vec![h, s]),
        }
    }

    /// Number of samples in this context's batch
    pub fn batch_size(&self) -> usize {
        self.input.shape[0]
    }

    /// Number of time steps the buffers were sized for
    pub fn time_steps(&self) -> usize {
        self.input.shape[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_shapes() {
        let config = RnnConfig::new(4, 3, 5);
        let ctx = TrainingContext::new(2, &config);

        assert_eq!(ctx.input.shape, vec![2, 4, 3]);
        assert_eq!(ctx.output.shape, vec![2, 4, 5]);
        assert_eq!(ctx.errors.shape, vec![2, 4, 5]);
        assert_eq!(ctx.w_grad.shape, vec![5, 5]);
        assert_eq!(ctx.u_grad.shape, vec![5, 3]);
        assert_eq!(ctx.batch_size(), 2);
        assert_eq!(ctx.time_steps(), 4);
    }

    #[test]
    fn test_buffers_start_zeroed() {
        let config = RnnConfig::new(2, 2, 2);
        let ctx = TrainingContext::new(1, &config);
        assert!(ctx.output.data.iter().all(|&v| v == 0.0));
        assert!(ctx.errors.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    #[should_panic(expected = "batch size must be positive")]
    fn test_rejects_empty_batch() {
        let config = RnnConfig::new(2, 2, 2);
        TrainingContext::new(0, &config);
    }
}
