//! Layer Capability Interface
//!
//! A network is assembled from layers of different kinds; the trainer only
//! needs the capabilities below to drive any of them through a training
//! step. Each layer kind declares its own context type (the per-mini-batch
//! scratch buffers its backward pass needs), so a dense layer and a
//! recurrent layer can cache different things behind the same interface.
//!
//! [`RecurrentLayer`](crate::RecurrentLayer) is this crate's concrete
//! implementor.

use crate::tensor::Tensor;

/// Operations every trainable layer exposes to the training loop
pub trait Layer {
    /// Per-mini-batch scratch buffers for this layer kind
    type Context;

    /// Fill `output` from `input` for a whole batch
    ///
    /// Batch dimensions must agree; a mismatch is a contract violation and
    /// panics.
    fn forward_batch(&self, input: &Tensor, output: &mut Tensor);

    /// Fill the context's weight gradients from its input/output/errors
    /// buffers
    fn compute_gradients(&self, context: &mut Self::Context);

    /// Propagate the error signal to the previous layer
    ///
    /// `prev_errors` has the shape of this layer's input batch.
    fn backward_batch(&self, context: &Self::Context, prev_errors: &mut Tensor);

    /// Flattened input size of one sample
    fn input_size(&self) -> usize;

    /// Flattened output size of one sample
    fn output_size(&self) -> usize;

    /// Number of trainable parameters
    fn parameters(&self) -> usize;

    /// Human-readable one-line description
    fn to_short_string(&self) -> String;
}
