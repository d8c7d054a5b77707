use crate::error::ShapeError;
use crate::loss::mse::check_same_len;
use crate::math::tensor::Tensor;

pub struct BceLoss;

const EPS: f64 = 1e-12;

impl BceLoss {
    /// Scalar BCE: -mean(y·log(p+ε) + (1-y)·log(1-p+ε))
    ///
    /// `predicted` must already be probabilities (pair with a Sigmoid layer).
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> Result<f64, ShapeError> {
        check_same_len("bce", predicted, expected)?;
        let n = predicted.len().max(1) as f64;
        Ok(predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| -(y * (p + EPS).ln() + (1.0 - y) * (1.0 - p + EPS).ln()))
            .sum::<f64>() / n)
    }

    /// Gradient w.r.t. `predicted`: (p - y) / ((p + ε)·(1 - p + ε)) / n
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Result<Tensor, ShapeError> {
        check_same_len("bce", predicted, expected)?;
        let n = predicted.len().max(1) as f64;
        let data = predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| (p - y) / ((p + EPS) * (1.0 - p + EPS)) / n)
            .collect();
        Tensor::from_vec(&predicted.shape, data)
    }
}
