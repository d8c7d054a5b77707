use crate::error::ShapeError;
use crate::math::tensor::Tensor;

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²) over every element.
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> Result<f64, ShapeError> {
        check_same_len("mse", predicted, expected)?;
        let n = predicted.len().max(1) as f64;
        Ok(predicted.data.iter().zip(&expected.data)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>() / n)
    }

    /// Gradient w.r.t. `predicted`: 2·(predicted - expected) / n
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Result<Tensor, ShapeError> {
        check_same_len("mse", predicted, expected)?;
        let n = predicted.len().max(1) as f64;
        let data = predicted.data.iter().zip(&expected.data)
            .map(|(a, b)| 2.0 * (a - b) / n)
            .collect();
        Tensor::from_vec(&predicted.shape, data)
    }
}

/// Element-wise losses accept any target layout with the same element
/// count (so `[N]` targets pair with `[N, 1]` outputs).
pub(crate) fn check_same_len(op: &'static str, predicted: &Tensor, expected: &Tensor) -> Result<(), ShapeError> {
    if predicted.len() != expected.len() {
        return Err(ShapeError::Mismatch {
            op,
            expected: predicted.shape.clone(),
            actual: expected.shape.clone(),
        });
    }
    Ok(())
}
