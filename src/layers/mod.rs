pub mod activation;
pub mod conv;
pub mod dense;
pub mod pool;

use std::fmt;

use crate::error::ShapeError;
use crate::math::tensor::Tensor;
use crate::network::spec::LayerKind;

pub use activation::ActivationLayer;
pub use conv::Conv2d;
pub use dense::Linear;
pub use pool::{AvgPool2d, MaxPool2d};

/// A trainable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// One constructed computational unit of a sequential model.
///
/// `forward` caches whatever `backward` needs; `backward` receives
/// ∂L/∂output, accumulates parameter gradients, and returns ∂L/∂input.
pub trait Module: fmt::Debug + Send {
    fn kind(&self) -> LayerKind;

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError>;

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError>;

    /// Named parameters (`"weight"`, `"bias"`); empty for stateless layers.
    fn parameters(&self) -> Vec<(&'static str, &Param)> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        Vec::new()
    }
}

/// Flat offset of `(n, c, h, w)` in an `[N, C, H, W]` buffer.
#[inline]
pub(crate) fn offset4(shape: &[usize], n: usize, c: usize, h: usize, w: usize) -> usize {
    ((n * shape[1] + c) * shape[2] + h) * shape[3] + w
}

/// Output length of a sliding window along one spatial axis.
pub(crate) fn window_len(
    op: &'static str,
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<usize, ShapeError> {
    let padded = input + 2 * padding;
    if padded < kernel {
        return Err(ShapeError::Geometry {
            op,
            reason: format!("kernel {} larger than padded input {}", kernel, padded),
        });
    }
    Ok((padded - kernel) / stride + 1)
}
