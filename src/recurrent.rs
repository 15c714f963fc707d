//! Recurrent (RNN) Layer with Truncated Backpropagation-Through-Time
//!
//! This is the crate's centerpiece: a layer mapping a batch of fixed-length
//! input sequences `[batch, T, S]` to hidden-state sequences `[batch, T, H]`
//! using two weight matrices shared across all time steps.
//!
//! ## Forward Recursion
//!
//! ```text
//! h[0] = f(U x[0])                    // the state before time 0 is zero
//! h[t] = f(U x[t] + W h[t-1])         // t = 1 .. T-1
//! ```
//!
//! where `U` is `[H, S]` (input-to-hidden), `W` is `[H, H]`
//! (hidden-to-hidden), and `f` is the configured elementwise activation.
//!
//! ## Backward Walk (truncated BPTT)
//!
//! The gradient engine seeds a delta at the last step and walks time
//! backward, accumulating one outer product per weight matrix per step:
//!
//! ```text
//! delta = errors[T-1] ⊙ f'(h[T-1])
//! for t = T-1 down to T-truncate:
//!     u_grad += outer(delta, x[t])
//!     w_grad += outer(delta, h[t-1])      // skipped at t = 0 (h[-1] = 0)
//!     delta   = (Wᵀ delta) ⊙ f'(h[t-1])
//! ```
//!
//! The u_grad accumulation uses `x[t]`, the input of the step the delta
//! belongs to; together with the `h[-1] = 0` convention this makes the
//! accumulated gradients exact, which the finite-difference tests below
//! verify entry by entry.
//!
//! ## Parallelism
//!
//! Samples are independent in both directions, so the per-sample loops run
//! on Rayon across the batch dimension. Gradient accumulation is a
//! map/reduce: each sample produces partial sums that are merged
//! afterwards, never shared mutable state. Within one sample the time loop
//! is strictly sequential (each step depends on its neighbor).
//!
//! ## Contract Violations
//!
//! Shape mismatches are programmer errors, not runtime data errors: every
//! entry point asserts its shape contract and panics on violation.

use crate::activation::Activation;
use crate::config::RnnConfig;
use crate::context::TrainingContext;
use crate::layer::Layer;
use crate::tensor::{outer_acc, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// A recurrent layer: two shared weight matrices plus optional snapshots
///
/// The weights are created once at construction by the configured
/// initializer policy and mutated only through
/// [`weights_mut`](Self::weights_mut) (the optimizer's update path).
/// Snapshots are an explicit optional state used to checkpoint parameters
/// around exploratory optimizer steps.
pub struct RecurrentLayer {
    config: RnnConfig,
    /// Recurrent (hidden-to-hidden) weights, `[H, H]`
    w: Tensor,
    /// Input (input-to-hidden) weights, `[H, S]`
    u: Tensor,
    /// Snapshot of `w`, present only between snapshot() and discard
    bak_w: Option<Tensor>,
    /// Snapshot of `u`
    bak_u: Option<Tensor>,
}

impl RecurrentLayer {
    /// Build a layer, drawing both weight matrices from the config's
    /// initializer policy
    ///
    /// The initializer is invoked exactly twice (once per matrix) with the
    /// layer's flattened input/output sizes as fan hints. The same seed
    /// always produces the same weights.
    pub fn new(config: RnnConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = config.hidden_units;
        let s = config.sequence_length;
        let (fan_in, fan_out) = (config.input_size(), config.output_size());

        let w = config.init.initialize(h, h, fan_in, fan_out, &mut rng);
        let u = config.init.initialize(h, s, fan_in, fan_out, &mut rng);

        Self {
            config,
            w,
            u,
            bak_w: None,
            bak_u: None,
        }
    }

    /// The layer's configuration
    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    /// Read access to the recurrent weights `W`
    pub fn w(&self) -> &Tensor {
        &self.w
    }

    /// Read access to the input weights `U`
    pub fn u(&self) -> &Tensor {
        &self.u
    }

    /// Mutable access to `(W, U)` for the optimizer's update step
    ///
    /// The caller must not change the matrices' shapes, and must not have
    /// any forward/gradient call in flight on this layer.
    pub fn weights_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.w, &mut self.u)
    }

    /// Copy both weight matrices into the backup slots
    ///
    /// An existing snapshot is overwritten. Observably atomic: there is no
    /// partial-snapshot state.
    pub fn snapshot(&mut self) {
        self.bak_w = Some(self.w.clone());
        self.bak_u = Some(self.u.clone());
    }

    /// Copy the backup weights back into the live matrices
    ///
    /// The snapshot stays in place, so repeated restores are valid.
    ///
    /// # Panics
    ///
    /// Panics if no snapshot exists; restoring without one is a contract
    /// violation.
    pub fn restore(&mut self) {
        let bak_w = self
            .bak_w
            .as_ref()
            .expect("restore() called without a prior snapshot");
        let bak_u = self
            .bak_u
            .as_ref()
            .expect("restore() called without a prior snapshot");
        self.w.data.copy_from_slice(&bak_w.data);
        self.u.data.copy_from_slice(&bak_u.data);
    }

    /// Whether a snapshot currently exists
    pub fn has_snapshot(&self) -> bool {
        self.bak_w.is_some()
    }

    /// Drop the snapshot, if any; absence of a snapshot is a valid state
    pub fn discard_snapshot(&mut self) {
        self.bak_w = None;
        self.bak_u = None;
    }

    /// Allocate a zeroed output batch of shape `[batch, T, H]`
    pub fn prepare_output(&self, batch: usize) -> Tensor {
        Tensor::zeros(vec![
            batch,
            self.config.time_steps,
            self.config.hidden_units,
        ])
    }

    /// Run the forward recursion for every sample of a batch
    ///
    /// `input` must be `[batch, T, S]` and `output` `[batch, T, H]` with
    /// matching batch dimensions. Deterministic; does not mutate weights.
    /// Samples are processed in parallel.
    ///
    /// # Panics
    ///
    /// Panics if the shapes don't match the layer's configuration or if
    /// the two batch dimensions disagree.
    pub fn forward_batch(&self, input: &Tensor, output: &mut Tensor) {
        let t = self.config.time_steps;
        let s = self.config.sequence_length;
        let h = self.config.hidden_units;

        assert_eq!(
            &input.shape[1..],
            &[t, s][..],
            "Input sample shape {:?} doesn't match layer [{}x{}]",
            &input.shape[1..],
            t,
            s
        );
        assert_eq!(
            &output.shape[1..],
            &[t, h][..],
            "Output sample shape {:?} doesn't match layer [{}x{}]",
            &output.shape[1..],
            t,
            h
        );
        assert_eq!(
            output.shape[0], input.shape[0],
            "The number of samples must be consistent: {} inputs vs {} outputs",
            input.shape[0], output.shape[0]
        );

        output
            .data
            .par_chunks_mut(t * h)
            .zip(input.data.par_chunks(t * s))
            .for_each(|(hidden, x)| self.forward_sample(x, hidden));
    }

    /// Forward pass on a context's own buffers (`input` -> `output`)
    pub fn forward_context(&self, ctx: &mut TrainingContext) {
        let TrainingContext { input, output, .. } = ctx;
        self.forward_batch(input, output);
    }

    /// One sample's forward recursion: `x` is `T*S` flat, `hidden` `T*H` flat
    fn forward_sample(&self, x: &[f32], hidden: &mut [f32]) {
        let t_steps = self.config.time_steps;
        let s = self.config.sequence_length;
        let h = self.config.hidden_units;
        let f = self.config.activation;

        let mut pre = vec![0.0f32; h];
        for t in 0..t_steps {
            self.u.matvec(&x[t * s..(t + 1) * s], &mut pre);
            if t > 0 {
                // Recurrent term; vanishes at t = 0 where the previous
                // state is the zero vector.
                self.w
                    .matvec_acc(&hidden[(t - 1) * h..t * h], &mut pre);
            }
            for (out, &z) in hidden[t * h..(t + 1) * h].iter_mut().zip(pre.iter()) {
                *out = f.forward(z);
            }
        }
    }

    /// Compute batch-summed weight gradients by truncated BPTT
    ///
    /// Zeroes `ctx.w_grad` / `ctx.u_grad`, then walks time backward for
    /// each sample (in parallel, merging per-sample partial sums) as
    /// described in the module documentation. After the call the two
    /// gradient matrices are ready for the optimizer.
    ///
    /// The context must have been filled by a forward pass, with at least
    /// the final time step of `errors` populated by the loss.
    ///
    /// # Panics
    ///
    /// Panics if the context's shapes don't match the layer configuration.
    pub fn compute_gradients(&self, ctx: &mut TrainingContext) {
        let t = self.config.time_steps;
        let s = self.config.sequence_length;
        let h = self.config.hidden_units;

        let TrainingContext {
            input,
            output,
            errors,
            w_grad,
            u_grad,
        } = ctx;
        let (input, output, errors): (&Tensor, &Tensor, &Tensor) = (input, output, errors);

        let batch = input.shape[0];
        assert_eq!(
            &input.shape[1..],
            &[t, s][..],
            "Context input shape {:?} doesn't match layer [{}x{}]",
            &input.shape[1..],
            t,
            s
        );
        assert_eq!(
            output.shape,
            vec![batch, t, h],
            "Context output shape {:?} doesn't match [{}x{}x{}]",
            output.shape,
            batch,
            t,
            h
        );
        assert_eq!(
            errors.shape, output.shape,
            "Context errors shape {:?} doesn't match output shape {:?}",
            errors.shape, output.shape
        );
        assert_eq!(w_grad.shape, vec![h, h], "w_grad must be [{}x{}]", h, h);
        assert_eq!(u_grad.shape, vec![h, s], "u_grad must be [{}x{}]", h, s);

        // Per-sample partial sums merged by reduction; batch order cannot
        // affect the result beyond floating-point summation order.
        let (w_sum, u_sum) = (0..batch)
            .into_par_iter()
            .map(|b| self.sample_gradients(input, output, errors, b))
            .reduce(
                || (vec![0.0; h * h], vec![0.0; h * s]),
                |(mut w_acc, mut u_acc), (w_part, u_part)| {
                    for (a, v) in w_acc.iter_mut().zip(&w_part) {
                        *a += v;
                    }
                    for (a, v) in u_acc.iter_mut().zip(&u_part) {
                        *a += v;
                    }
                    (w_acc, u_acc)
                },
            );

        w_grad.data.copy_from_slice(&w_sum);
        u_grad.data.copy_from_slice(&u_sum);
    }

    /// Backward time-walk for one sample, producing its gradient partials
    fn sample_gradients(
        &self,
        input: &Tensor,
        output: &Tensor,
        errors: &Tensor,
        b: usize,
    ) -> (Vec<f32>, Vec<f32>) {
        let t_steps = self.config.time_steps;
        let s = self.config.sequence_length;
        let h = self.config.hidden_units;
        let f = self.config.activation;

        // truncate is the number of steps walked; with truncate == T the
        // walk reaches t = 0.
        let last_step = t_steps - self.config.truncate;

        let mut w_grad = vec![0.0f32; h * h];
        let mut u_grad = vec![0.0f32; h * s];

        let mut delta: Vec<f32> = errors
            .step(b, t_steps - 1)
            .iter()
            .zip(output.step(b, t_steps - 1))
            .map(|(&e, &y)| e * f.derivative(y))
            .collect();

        let mut t = t_steps - 1;
        let mut carried = vec![0.0f32; h];
        loop {
            outer_acc(&mut u_grad, &delta, input.step(b, t));
            if t > 0 {
                outer_acc(&mut w_grad, &delta, output.step(b, t - 1));
            }
            if t == last_step {
                break;
            }

            // delta = (Wᵀ delta) ⊙ f'(h[t-1])
            self.w.matvec_transpose(&delta, &mut carried);
            for ((d, &c), &y) in delta
                .iter_mut()
                .zip(carried.iter())
                .zip(output.step(b, t - 1))
            {
                *d = c * f.derivative(y);
            }
            t -= 1;
        }

        (w_grad, u_grad)
    }

    /// Propagate the error signal to the previous layer's output space
    ///
    /// Fills `prev_errors` (`[batch, T, S]`, same shape as the original
    /// input batch) with the loss gradient w.r.t. this layer's inputs:
    ///
    /// ```text
    /// delta[T-1] = errors[T-1] ⊙ f'(h[T-1])
    /// delta[t]   = (errors[t] + Wᵀ delta[t+1]) ⊙ f'(h[t])
    /// prev_errors[t] = Uᵀ delta[t]
    /// ```
    ///
    /// Unlike the weight-gradient walk this chain consumes the error slice
    /// at *every* step, so intermediate layers that receive errors at all
    /// positions propagate them all; when only the final step is populated
    /// it degrades to the same seeded chain the gradient engine uses.
    ///
    /// # Panics
    ///
    /// Panics if `prev_errors` doesn't have the input batch's shape.
    pub fn backward_batch(&self, ctx: &TrainingContext, prev_errors: &mut Tensor) {
        let t = self.config.time_steps;
        let s = self.config.sequence_length;

        assert_eq!(
            prev_errors.shape, ctx.input.shape,
            "Previous-layer error shape {:?} must match input shape {:?}",
            prev_errors.shape, ctx.input.shape
        );

        prev_errors
            .data
            .par_chunks_mut(t * s)
            .enumerate()
            .for_each(|(b, grad_x)| self.backward_sample(ctx, b, grad_x));
    }

    /// One sample's input-gradient chain, writing `T*S` values into `grad_x`
    fn backward_sample(&self, ctx: &TrainingContext, b: usize, grad_x: &mut [f32]) {
        let t_steps = self.config.time_steps;
        let s = self.config.sequence_length;
        let h = self.config.hidden_units;
        let f = self.config.activation;

        let mut delta = vec![0.0f32; h];
        let mut carried = vec![0.0f32; h];

        for t in (0..t_steps).rev() {
            let y = ctx.output.step(b, t);
            let e = ctx.errors.step(b, t);

            if t == t_steps - 1 {
                for ((d, &ei), &yi) in delta.iter_mut().zip(e.iter()).zip(y.iter()) {
                    *d = ei * f.derivative(yi);
                }
            } else {
                self.w.matvec_transpose(&delta, &mut carried);
                for (((d, &c), &ei), &yi) in delta
                    .iter_mut()
                    .zip(carried.iter())
                    .zip(e.iter())
                    .zip(y.iter())
                {
                    *d = (ei + c) * f.derivative(yi);
                }
            }

            self.u
                .matvec_transpose(&delta, &mut grad_x[t * s..(t + 1) * s]);
        }
    }

    /// Flattened input size: `T * S`
    pub fn input_size(&self) -> usize {
        self.config.input_size()
    }

    /// Flattened output size: `T * H`
    pub fn output_size(&self) -> usize {
        self.config.output_size()
    }

    /// Number of trainable parameters: `H*H + H*S`
    pub fn parameters(&self) -> usize {
        self.config.parameters()
    }

    /// Human-readable shape/activation summary
    ///
    /// `"RNN: TxS -> TxH"` for identity activation, otherwise
    /// `"RNN: TxS -> <activation> -> TxH"`.
    pub fn to_short_string(&self) -> String {
        let c = &self.config;
        if c.activation == Activation::Identity {
            format!(
                "RNN: {}x{} -> {}x{}",
                c.time_steps, c.sequence_length, c.time_steps, c.hidden_units
            )
        } else {
            format!(
                "RNN: {}x{} -> {} -> {}x{}",
                c.time_steps, c.sequence_length, c.activation, c.time_steps, c.hidden_units
            )
        }
    }
}

impl Layer for RecurrentLayer {
    type Context = TrainingContext;

    fn forward_batch(&self, input: &Tensor, output: &mut Tensor) {
        RecurrentLayer::forward_batch(self, input, output);
    }

    fn compute_gradients(&self, context: &mut TrainingContext) {
        RecurrentLayer::compute_gradients(self, context);
    }

    fn backward_batch(&self, context: &TrainingContext, prev_errors: &mut Tensor) {
        RecurrentLayer::backward_batch(self, context, prev_errors);
    }

    fn input_size(&self) -> usize {
        RecurrentLayer::input_size(self)
    }

    fn output_size(&self) -> usize {
        RecurrentLayer::output_size(self)
    }

    fn parameters(&self) -> usize {
        RecurrentLayer::parameters(self)
    }

    fn to_short_string(&self) -> String {
        RecurrentLayer::to_short_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::Init;

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32, what: &str) {
        assert_eq!(actual.len(), expected.len(), "{}: length mismatch", what);
        for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
            assert!(
                (a - e).abs() <= tol,
                "{}[{}]: {} vs {} (tol {})",
                what,
                i,
                a,
                e,
                tol
            );
        }
    }

    /// Layer with hand-set weights so tests are independent of the RNG
    fn fixed_layer(config: RnnConfig, w: &[f32], u: &[f32]) -> RecurrentLayer {
        let mut layer = RecurrentLayer::new(config.with_init(Init::Zero), 0);
        let (lw, lu) = layer.weights_mut();
        lw.data.copy_from_slice(w);
        lu.data.copy_from_slice(u);
        layer
    }

    /// T=3, S=2, H=2 tanh layer used by the gradient checks
    fn small_tanh_layer(truncate: usize) -> RecurrentLayer {
        let config = RnnConfig::new(3, 2, 2)
            .with_activation(Activation::Tanh)
            .with_truncate(truncate);
        fixed_layer(
            config,
            &[0.3, -0.2, 0.1, 0.4],
            &[0.5, -0.3, 0.2, 0.1],
        )
    }

    fn small_input(batch: usize) -> Tensor {
        let mut data = vec![
            0.5, -1.0, // b0 t0
            0.25, 0.75, // b0 t1
            -0.5, 1.0, // b0 t2
            -0.8, 0.3, // b1 t0
            0.6, -0.4, // b1 t1
            0.9, 0.2, // b1 t2
        ];
        data.truncate(batch * 6);
        Tensor::new(data, vec![batch, 3, 2])
    }

    /// Sum of squared outputs at the final time step, over the whole batch
    fn last_step_loss(layer: &RecurrentLayer, input: &Tensor) -> f32 {
        let mut output = layer.prepare_output(input.shape[0]);
        layer.forward_batch(input, &mut output);
        let last = layer.config().time_steps - 1;
        (0..input.shape[0])
            .flat_map(|b| output.step(b, last).to_vec())
            .map(|y| y * y)
            .sum()
    }

    /// Sum of squared outputs at every time step, over the whole batch
    fn all_steps_loss(layer: &RecurrentLayer, input: &Tensor) -> f32 {
        let mut output = layer.prepare_output(input.shape[0]);
        layer.forward_batch(input, &mut output);
        output.data.iter().map(|&y| y * y).sum()
    }

    /// Fill a context from `input`, run forward, and derive `errors` from
    /// the sum-of-squares loss on the final step (dL/dy = 2y).
    fn prepared_context(layer: &RecurrentLayer, input: &Tensor) -> TrainingContext {
        let mut ctx = TrainingContext::new(input.shape[0], layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);

        let last = layer.config().time_steps - 1;
        for b in 0..ctx.batch_size() {
            let grads: Vec<f32> = ctx.output.step(b, last).iter().map(|&y| 2.0 * y).collect();
            ctx.errors.step_mut(b, last).copy_from_slice(&grads);
        }
        ctx
    }

    #[test]
    fn test_zero_initial_state() {
        // h[0] must be f(U x[0]) with no recurrent contribution.
        let config = RnnConfig::new(3, 2, 4);
        let layer = RecurrentLayer::new(config, 9);
        let input = small_input(1);

        let mut output = layer.prepare_output(1);
        layer.forward_batch(&input, &mut output);

        let mut pre = vec![0.0; 4];
        layer.u().matvec(input.step(0, 0), &mut pre);
        let expected: Vec<f32> = pre.iter().map(|&z| Activation::Tanh.forward(z)).collect();

        assert_eq!(output.step(0, 0), expected.as_slice());
    }

    #[test]
    fn test_forward_is_deterministic() {
        let layer = RecurrentLayer::new(RnnConfig::new(4, 3, 5), 17);
        let data: Vec<f32> = (0..24).map(|i| (i as f32) * 0.1 - 1.0).collect();
        let input = Tensor::new(data, vec![2, 4, 3]);

        let mut out_a = layer.prepare_output(2);
        let mut out_b = layer.prepare_output(2);
        layer.forward_batch(&input, &mut out_a);
        layer.forward_batch(&input, &mut out_b);

        assert_eq!(out_a.data, out_b.data);
    }

    #[test]
    fn test_forward_shape_preservation() {
        let layer = RecurrentLayer::new(RnnConfig::new(3, 2, 4), 5);
        for batch in 1..=4 {
            let input = Tensor::zeros(vec![batch, 3, 2]);
            let mut output = layer.prepare_output(batch);
            layer.forward_batch(&input, &mut output);
            assert_eq!(output.shape, vec![batch, 3, 4]);
        }
    }

    #[test]
    #[should_panic(expected = "The number of samples must be consistent")]
    fn test_forward_rejects_batch_mismatch() {
        let layer = RecurrentLayer::new(RnnConfig::new(2, 2, 2), 1);
        let input = Tensor::zeros(vec![2, 2, 2]);
        let mut output = Tensor::zeros(vec![3, 2, 2]);
        layer.forward_batch(&input, &mut output);
    }

    #[test]
    fn test_forward_context_matches_forward_batch() {
        let layer = small_tanh_layer(3);
        let input = small_input(2);

        let mut output = layer.prepare_output(2);
        layer.forward_batch(&input, &mut output);

        let mut ctx = TrainingContext::new(2, layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);

        assert_eq!(ctx.output.data, output.data);
    }

    #[test]
    fn test_concrete_scenario() {
        // T=2, S=1, H=1, identity, W=0.5, U=2.0, x=[1, 1]:
        //   h[0] = 2*1          = 2
        //   h[1] = 2*1 + 0.5*2  = 3
        // With errors[1] = 1 and full-length BPTT:
        //   delta@1 = 1;  w_grad = 1*h[0] = 2;  u_grad = 1*x[1] = 1
        //   delta@0 = W*1 = 0.5;  u_grad += 0.5*x[0] = 0.5  -> 1.5
        let config = RnnConfig::new(2, 1, 1).with_activation(Activation::Identity);
        let layer = fixed_layer(config, &[0.5], &[2.0]);

        let input = Tensor::new(vec![1.0, 1.0], vec![1, 2, 1]);
        let mut ctx = TrainingContext::new(1, layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);
        assert_eq!(ctx.output.data, vec![2.0, 3.0]);

        ctx.errors.step_mut(0, 1)[0] = 1.0;
        layer.compute_gradients(&mut ctx);

        assert_eq!(ctx.w_grad.data, vec![2.0]);
        assert_eq!(ctx.u_grad.data, vec![1.5]);
    }

    #[test]
    fn test_gradients_match_finite_difference() {
        // Central finite difference on every weight entry, against the
        // analytic BPTT gradients, for loss = sum of squared final-step
        // outputs. f32 arithmetic bounds the attainable agreement.
        let layer = small_tanh_layer(3);
        let input = small_input(2);

        let mut ctx = prepared_context(&layer, &input);
        layer.compute_gradients(&mut ctx);
        let analytic_w = ctx.w_grad.data.clone();
        let analytic_u = ctx.u_grad.data.clone();

        let eps = 1e-2f32;
        let tol = 5e-3f32;
        let mut probe = small_tanh_layer(3);

        for idx in 0..analytic_w.len() {
            let base = probe.w().data[idx];
            probe.weights_mut().0.data[idx] = base + eps;
            let plus = last_step_loss(&probe, &input);
            probe.weights_mut().0.data[idx] = base - eps;
            let minus = last_step_loss(&probe, &input);
            probe.weights_mut().0.data[idx] = base;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic_w[idx] - numeric).abs() <= tol * numeric.abs().max(1.0),
                "w_grad[{}]: analytic {} vs numeric {}",
                idx,
                analytic_w[idx],
                numeric
            );
        }

        for idx in 0..analytic_u.len() {
            let base = probe.u().data[idx];
            probe.weights_mut().1.data[idx] = base + eps;
            let plus = last_step_loss(&probe, &input);
            probe.weights_mut().1.data[idx] = base - eps;
            let minus = last_step_loss(&probe, &input);
            probe.weights_mut().1.data[idx] = base;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic_u[idx] - numeric).abs() <= tol * numeric.abs().max(1.0),
                "u_grad[{}]: analytic {} vs numeric {}",
                idx,
                analytic_u[idx],
                numeric
            );
        }
    }

    #[test]
    fn test_truncation_bound_of_one_touches_single_step() {
        // With truncate = 1 only the most recent step's outer products may
        // appear: w_grad = outer(delta, h[T-2]), u_grad = outer(delta, x[T-1]).
        let config = RnnConfig::new(3, 2, 2)
            .with_activation(Activation::Identity)
            .with_truncate(1);
        let layer = fixed_layer(config, &[0.3, -0.2, 0.1, 0.4], &[0.5, -0.3, 0.2, 0.1]);
        let input = small_input(1);

        let mut ctx = TrainingContext::new(1, layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);
        ctx.errors.step_mut(0, 2).copy_from_slice(&[1.0, -2.0]);

        layer.compute_gradients(&mut ctx);

        // Identity activation: delta is the raw final-step error.
        let delta = [1.0f32, -2.0];
        let mut expected_w = vec![0.0; 4];
        let mut expected_u = vec![0.0; 4];
        outer_acc(&mut expected_w, &delta, ctx.output.step(0, 1));
        outer_acc(&mut expected_u, &delta, ctx.input.step(0, 2));

        assert_close(&ctx.w_grad.data, &expected_w, 1e-6, "w_grad");
        assert_close(&ctx.u_grad.data, &expected_u, 1e-6, "u_grad");
    }

    #[test]
    fn test_single_time_step_has_no_recurrent_gradient() {
        // T = 1: there is no previous hidden state, so w_grad stays zero.
        let config = RnnConfig::new(1, 2, 2).with_activation(Activation::Identity);
        let layer = fixed_layer(config, &[0.3, -0.2, 0.1, 0.4], &[0.5, -0.3, 0.2, 0.1]);

        let input = Tensor::new(vec![1.0, -2.0], vec![1, 1, 2]);
        let mut ctx = TrainingContext::new(1, layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);
        ctx.errors.step_mut(0, 0).copy_from_slice(&[1.0, 1.0]);

        layer.compute_gradients(&mut ctx);

        assert!(ctx.w_grad.data.iter().all(|&v| v == 0.0));
        let mut expected_u = vec![0.0; 4];
        outer_acc(&mut expected_u, &[1.0, 1.0], &[1.0, -2.0]);
        assert_close(&ctx.u_grad.data, &expected_u, 1e-6, "u_grad");
    }

    #[test]
    fn test_batch_additivity() {
        // Gradients of a 2-sample batch equal the sum of the per-sample
        // gradients computed separately.
        let layer = small_tanh_layer(3);
        let both = small_input(2);

        let mut ctx_both = prepared_context(&layer, &both);
        layer.compute_gradients(&mut ctx_both);

        let mut w_sum = vec![0.0f32; 4];
        let mut u_sum = vec![0.0f32; 4];
        for b in 0..2 {
            let mut data = Vec::with_capacity(6);
            for t in 0..3 {
                data.extend_from_slice(both.step(b, t));
            }
            let single = Tensor::new(data, vec![1, 3, 2]);

            let mut ctx = prepared_context(&layer, &single);
            layer.compute_gradients(&mut ctx);
            for (a, &v) in w_sum.iter_mut().zip(&ctx.w_grad.data) {
                *a += v;
            }
            for (a, &v) in u_sum.iter_mut().zip(&ctx.u_grad.data) {
                *a += v;
            }
        }

        assert_close(&ctx_both.w_grad.data, &w_sum, 1e-6, "w_grad");
        assert_close(&ctx_both.u_grad.data, &u_sum, 1e-6, "u_grad");
    }

    #[test]
    fn test_backward_batch_matches_finite_difference() {
        // Loss = sum of squared outputs at every step, so errors[t] = 2 h[t]
        // for all t; backward_batch must then match d(loss)/d(input).
        let layer = small_tanh_layer(3);
        let input = small_input(2);

        let mut ctx = TrainingContext::new(2, layer.config());
        ctx.input.data.copy_from_slice(&input.data);
        layer.forward_context(&mut ctx);
        for b in 0..2 {
            for t in 0..3 {
                let grads: Vec<f32> =
                    ctx.output.step(b, t).iter().map(|&y| 2.0 * y).collect();
                ctx.errors.step_mut(b, t).copy_from_slice(&grads);
            }
        }

        let mut prev_errors = Tensor::zeros(vec![2, 3, 2]);
        layer.backward_batch(&ctx, &mut prev_errors);

        let eps = 1e-2f32;
        let tol = 5e-3f32;
        for idx in 0..input.data.len() {
            let mut perturbed = input.clone();
            perturbed.data[idx] = input.data[idx] + eps;
            let plus = all_steps_loss(&layer, &perturbed);
            perturbed.data[idx] = input.data[idx] - eps;
            let minus = all_steps_loss(&layer, &perturbed);

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (prev_errors.data[idx] - numeric).abs() <= tol * numeric.abs().max(1.0),
                "input grad [{}]: analytic {} vs numeric {}",
                idx,
                prev_errors.data[idx],
                numeric
            );
        }
    }

    #[test]
    fn test_backward_batch_is_input_shaped() {
        let layer = small_tanh_layer(3);
        let input = small_input(2);
        let ctx = prepared_context(&layer, &input);

        let mut prev_errors = Tensor::zeros(vec![2, 3, 2]);
        layer.backward_batch(&ctx, &mut prev_errors);
        assert_eq!(prev_errors.shape, ctx.input.shape);
    }

    #[test]
    #[should_panic(expected = "Previous-layer error shape")]
    fn test_backward_batch_rejects_wrong_shape() {
        let layer = small_tanh_layer(3);
        let ctx = prepared_context(&layer, &small_input(2));
        let mut wrong = Tensor::zeros(vec![2, 3, 3]);
        layer.backward_batch(&ctx, &mut wrong);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut layer = RecurrentLayer::new(RnnConfig::new(2, 2, 3), 11);
        let w_before = layer.w().data.clone();
        let u_before = layer.u().data.clone();

        assert!(!layer.has_snapshot());
        layer.snapshot();
        assert!(layer.has_snapshot());

        // Simulate an exploratory optimizer step.
        let (w, u) = layer.weights_mut();
        w.data.iter_mut().for_each(|v| *v += 1.0);
        u.data.iter_mut().for_each(|v| *v -= 1.0);
        assert_ne!(layer.w().data, w_before);

        layer.restore();
        assert_eq!(layer.w().data, w_before);
        assert_eq!(layer.u().data, u_before);

        // The snapshot survives a restore and can be dropped explicitly.
        assert!(layer.has_snapshot());
        layer.discard_snapshot();
        assert!(!layer.has_snapshot());
    }

    #[test]
    #[should_panic(expected = "restore() called without a prior snapshot")]
    fn test_restore_without_snapshot_panics() {
        let mut layer = RecurrentLayer::new(RnnConfig::new(2, 2, 2), 0);
        layer.restore();
    }

    #[test]
    fn test_metadata_accessors() {
        let layer = RecurrentLayer::new(RnnConfig::new(5, 3, 7), 0);
        assert_eq!(layer.input_size(), 15);
        assert_eq!(layer.output_size(), 35);
        assert_eq!(layer.parameters(), 49 + 21);
    }

    #[test]
    fn test_to_short_string() {
        let identity = RecurrentLayer::new(
            RnnConfig::new(2, 1, 1).with_activation(Activation::Identity),
            0,
        );
        assert_eq!(identity.to_short_string(), "RNN: 2x1 -> 2x1");

        let tanh = RecurrentLayer::new(RnnConfig::new(3, 2, 4), 0);
        assert_eq!(tanh.to_short_string(), "RNN: 3x2 -> tanh -> 3x4");
    }

    #[test]
    fn test_usable_through_layer_trait() {
        fn describe<L: Layer>(layer: &L) -> (usize, usize, usize, String) {
            (
                layer.input_size(),
                layer.output_size(),
                layer.parameters(),
                layer.to_short_string(),
            )
        }

        let layer = RecurrentLayer::new(RnnConfig::new(2, 1, 1), 0);
        let (input, output, params, desc) = describe(&layer);
        assert_eq!((input, output, params), (2, 2, 2));
        assert!(desc.starts_with("RNN:"));
    }
}
