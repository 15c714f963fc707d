//! tbptt: A Recurrent Layer with Truncated Backpropagation-Through-Time
//!
//! One layer type of a CPU training engine: a recurrent (RNN) layer that
//! maps fixed-length input sequences to hidden-state sequences through two
//! weight matrices shared across time steps, with the learning signal
//! propagated backward along the same temporal chain (truncated BPTT).
//!
//! # Modules
//!
//! - [`tensor`] - Row-major f32 tensors and the small linear-algebra kernels
//! - [`activation`] - Elementwise nonlinearities with derivatives-from-output
//! - [`init`] - Seeded weight-initialization policies
//! - [`config`] - Immutable layer configuration (T, S, H, activation, truncation)
//! - [`context`] - Per-mini-batch scratch buffers (input/output/errors/gradients)
//! - [`recurrent`] - The layer: forward pass, gradient engine, error propagation
//! - [`layer`] - The capability trait shared by trainable layer kinds
//! - [`gradients`] - Gradient norm and clipping utilities
//!
//! # Example
//!
//! ```rust
//! use tbptt::{Activation, RecurrentLayer, RnnConfig, Tensor, TrainingContext};
//!
//! // 4 time steps, 3 input features per step, 8 hidden units
//! let config = RnnConfig::new(4, 3, 8).with_activation(Activation::Tanh);
//! let layer = RecurrentLayer::new(config.clone(), 42);
//!
//! // One training mini-batch of 2 sequences
//! let mut ctx = TrainingContext::new(2, &config);
//! ctx.input = Tensor::new(vec![0.1; 2 * 4 * 3], vec![2, 4, 3]);
//! layer.forward_context(&mut ctx);
//!
//! // The loss writes the final-step error signal, then the gradient
//! // engine fills ctx.w_grad / ctx.u_grad for the optimizer.
//! ctx.errors.step_mut(0, 3).copy_from_slice(&[1.0; 8]);
//! layer.compute_gradients(&mut ctx);
//! assert_eq!(ctx.w_grad.shape, vec![8, 8]);
//! ```

pub mod activation;
pub mod config;
pub mod context;
pub mod gradients;
pub mod init;
pub mod layer;
pub mod recurrent;
pub mod tensor;

// Re-export main types for convenience
pub use activation::Activation;
pub use config::RnnConfig;
pub use context::TrainingContext;
pub use gradients::{clip_gradients, compute_grad_norm};
pub use init::Init;
pub use layer::Layer;
pub use recurrent::RecurrentLayer;
pub use tensor::{outer_acc, Tensor};
