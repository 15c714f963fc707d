//! Gradient Utilities
//!
//! Helpers for working with the gradients a training context accumulates.
//!
//! ## Gradient Clipping
//!
//! Recurrent layers are prone to exploding gradients: the backward walk
//! multiplies by `Wᵀ` once per time step, so an occasional batch can
//! produce updates large enough to destabilize training. Clipping rescales
//! the whole gradient when its L2 norm exceeds a threshold:
//!
//! ```text
//! norm = √(Σ g²)                 // over w_grad and u_grad together
//! if norm > max_norm:
//!     gradients *= max_norm / norm
//! ```
//!
//! Both matrices are scaled by the same factor, preserving the update's
//! direction while bounding its magnitude.

use crate::context::TrainingContext;

/// L2 norm over both accumulated gradient matrices
///
/// A single number summarizing the magnitude of the pending update; useful
/// for monitoring as well as for clipping.
pub fn compute_grad_norm(ctx: &TrainingContext) -> f32 {
    (ctx.w_grad.sum_squares() + ctx.u_grad.sum_squares()).sqrt()
}

/// Clip the context's gradients to a maximum L2 norm, in place
///
/// No-op when the norm is already within `max_norm`.
pub fn clip_gradients(ctx: &mut TrainingContext, max_norm: f32) {
    let norm = compute_grad_norm(ctx);
    if norm > max_norm {
        let scale = max_norm / norm;
        ctx.w_grad.scale(scale);
        ctx.u_grad.scale(scale);
    }
}
