//! Tensor Storage for the Recurrent Kernels
//!
//! This module provides the minimal tensor type the recurrent layer needs.
//! Tensors store multi-dimensional arrays with shape and stride information
//! for efficient indexing and memory layout.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, time, features]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Shapes Used by the Layer
//!
//! - Weight matrices are 2D: `[hidden, hidden]` and `[hidden, features]`
//! - Sequence batches are 3D: `[batch, time, features]`, where each
//!   `(batch, time)` pair addresses one contiguous step vector
//!
//! ## Example
//!
//! ```rust
//! use tbptt::Tensor;
//!
//! // A 2x3 matrix
//! let w = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//!
//! // y = W x
//! let mut y = vec![0.0; 2];
//! w.matvec(&[1.0, 0.0, 1.0], &mut y);
//! assert_eq!(y, vec![4.0, 10.0]);
//! ```
//!
//! ## Performance
//!
//! Whole-tensor element-wise operations use Rayon. The matrix-vector
//! products stay sequential: they run on H-length vectors inside per-sample
//! loops that are themselves parallelized across the batch dimension.

use rayon::prelude::*;

/// A multi-dimensional array for the recurrent layer's computations
///
/// Tensors store data in a contiguous `Vec<f32>` with shape and stride
/// information for efficient multi-dimensional indexing. All operations use
/// row-major (C-style) memory layout.
///
/// # Memory Layout
///
/// For shape `[2, 3]`, data is stored as:
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
///
/// Strides would be `[3, 1]` meaning:
/// - Moving one step in dimension 0 advances 3 positions in data
/// - Moving one step in dimension 1 advances 1 position in data
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    ///
    /// # Example
    ///
    /// ```rust
    /// # use tbptt::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    ///
    /// # Example
    ///
    /// ```rust
    /// # use tbptt::Tensor;
    /// let tensor = Tensor::zeros(vec![3, 4]);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        let data = vec![0.0; size];
        Self::new(data, shape)
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// One time-step vector of a 3D `[batch, time, features]` tensor
    ///
    /// Returns the contiguous feature slice at sample `b`, step `t`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 3D or the indices are out of bounds
    ///
    /// # Example
    ///
    /// ```rust
    /// # use tbptt::Tensor;
    /// let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![1, 2, 2]);
    /// assert_eq!(x.step(0, 1), &[3.0, 4.0]);
    /// ```
    pub fn step(&self, b: usize, t: usize) -> &[f32] {
        assert_eq!(self.shape.len(), 3, "step() requires a 3D tensor");
        assert!(
            b < self.shape[0] && t < self.shape[1],
            "Step index ({}, {}) out of bounds for shape {:?}",
            b,
            t,
            self.shape
        );
        let features = self.shape[2];
        let start = b * self.strides[0] + t * self.strides[1];
        &self.data[start..start + features]
    }

    /// Mutable access to one time-step vector of a 3D tensor
    ///
    /// See [`step`](Self::step) for the indexing contract.
    pub fn step_mut(&mut self, b: usize, t: usize) -> &mut [f32] {
        assert_eq!(self.shape.len(), 3, "step_mut() requires a 3D tensor");
        assert!(
            b < self.shape[0] && t < self.shape[1],
            "Step index ({}, {}) out of bounds for shape {:?}",
            b,
            t,
            self.shape
        );
        let features = self.shape[2];
        let start = b * self.strides[0] + t * self.strides[1];
        &mut self.data[start..start + features]
    }

    /// Matrix-vector product: `out = self @ x`
    ///
    /// `self` must be 2D `[m, n]`, `x` of length `n`, `out` of length `m`.
    /// Overwrites `out`.
    ///
    /// # Panics
    ///
    /// Panics on any dimension mismatch
    pub fn matvec(&self, x: &[f32], out: &mut [f32]) {
        out.fill(0.0);
        self.matvec_acc(x, out);
    }

    /// Accumulating matrix-vector product: `out += self @ x`
    ///
    /// Same shape contract as [`matvec`](Self::matvec), but adds into `out`
    /// instead of overwriting it. This is the form the forward recursion
    /// uses to combine the input term with the recurrent term.
    pub fn matvec_acc(&self, x: &[f32], out: &mut [f32]) {
        assert_eq!(self.shape.len(), 2, "matvec requires a 2D tensor");
        let (m, n) = (self.shape[0], self.shape[1]);
        assert_eq!(
            x.len(),
            n,
            "matvec dimensions incompatible: [{}, {}] @ [{}]",
            m,
            n,
            x.len()
        );
        assert_eq!(
            out.len(),
            m,
            "matvec output length {} doesn't match {} rows",
            out.len(),
            m
        );

        for (i, o) in out.iter_mut().enumerate() {
            let row = &self.data[i * n..(i + 1) * n];
            let mut sum = 0.0;
            for (w, &v) in row.iter().zip(x.iter()) {
                sum += w * v;
            }
            *o += sum;
        }
    }

    /// Transposed matrix-vector product: `out = selfᵀ @ x`
    ///
    /// `self` must be 2D `[m, n]`, `x` of length `m`, `out` of length `n`.
    /// Overwrites `out`. This is how the backward walk pushes a delta
    /// through `Wᵀ` and how input gradients flow through `Uᵀ`, without
    /// materializing a transposed copy of the weights.
    ///
    /// # Panics
    ///
    /// Panics on any dimension mismatch
    pub fn matvec_transpose(&self, x: &[f32], out: &mut [f32]) {
        assert_eq!(self.shape.len(), 2, "matvec_transpose requires a 2D tensor");
        let (m, n) = (self.shape[0], self.shape[1]);
        assert_eq!(
            x.len(),
            m,
            "matvec_transpose dimensions incompatible: [{}, {}]ᵀ @ [{}]",
            m,
            n,
            x.len()
        );
        assert_eq!(
            out.len(),
            n,
            "matvec_transpose output length {} doesn't match {} columns",
            out.len(),
            n
        );

        out.fill(0.0);
        for (i, &xi) in x.iter().enumerate() {
            let row = &self.data[i * n..(i + 1) * n];
            for (o, &w) in out.iter_mut().zip(row.iter()) {
                *o += w * xi;
            }
        }
    }

    /// Scale all elements in place
    ///
    /// Parallelized via Rayon; used by gradient clipping.
    pub fn scale(&mut self, factor: f32) {
        self.data.par_iter_mut().for_each(|v| *v *= factor);
    }

    /// Sum of squared elements
    ///
    /// Parallelized via Rayon; used for gradient norms.
    pub fn sum_squares(&self) -> f32 {
        self.data.par_iter().map(|&v| v * v).sum()
    }
}

/// Accumulate an outer product into a flat row-major matrix buffer
///
/// Computes `acc[i][j] += a[i] * b[j]` where `acc` has `a.len()` rows and
/// `b.len()` columns. This is the kernel that builds the weight gradients
/// from per-step (delta, activation) and (delta, input) pairs.
///
/// # Panics
///
/// Panics if `acc.len() != a.len() * b.len()`
pub fn outer_acc(acc: &mut [f32], a: &[f32], b: &[f32]) {
    assert_eq!(
        acc.len(),
        a.len() * b.len(),
        "Outer product accumulator length {} doesn't match {}x{}",
        acc.len(),
        a.len(),
        b.len()
    );

    for (i, &ai) in a.iter().enumerate() {
        let row = &mut acc[i * b.len()..(i + 1) * b.len()];
        for (r, &bj) in row.iter_mut().zip(b.iter()) {
            *r += ai * bj;
        }
    }
}
