use serde::{Serialize, Deserialize};

use crate::error::ShapeError;
use crate::loss::{BceLoss, CrossEntropyLoss, MseLoss};
use crate::math::tensor::Tensor;

/// Selects which loss function the training loop uses.
///
/// - `CrossEntropy` — logits `[N, C]` against class indices; softmax is internal.
/// - `Mse`          — mean-squared error against same-sized targets.
/// - `Bce`          — binary cross-entropy; pair with a Sigmoid output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CrossEntropy,
    Mse,
    Bce,
}

impl LossType {
    pub fn loss(self, predicted: &Tensor, expected: &Tensor) -> Result<f64, ShapeError> {
        match self {
            LossType::CrossEntropy => CrossEntropyLoss::loss(predicted, expected),
            LossType::Mse => MseLoss::loss(predicted, expected),
            LossType::Bce => BceLoss::loss(predicted, expected),
        }
    }

    /// ∂L/∂predicted, the initial delta for the backward pass.
    pub fn derivative(self, predicted: &Tensor, expected: &Tensor) -> Result<Tensor, ShapeError> {
        match self {
            LossType::CrossEntropy => CrossEntropyLoss::derivative(predicted, expected),
            LossType::Mse => MseLoss::derivative(predicted, expected),
            LossType::Bce => BceLoss::derivative(predicted, expected),
        }
    }

    /// Loss value and gradient in one call.
    pub fn compute(self, predicted: &Tensor, expected: &Tensor) -> Result<(f64, Tensor), ShapeError> {
        Ok((self.loss(predicted, expected)?, self.derivative(predicted, expected)?))
    }
}

impl Default for LossType {
    fn default() -> Self {
        LossType::CrossEntropy
    }
}
