use crate::error::ShapeError;
use crate::math::tensor::Tensor;

/// Cross-entropy over raw logits with integer class targets.
///
/// The softmax is folded into the loss, so the network's last layer should
/// emit unnormalised scores rather than probabilities.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Mean over the batch of `logsumexp(z_i) - z_i[t_i]`.
    ///
    /// `predicted` — logits, shape `[N, C]`
    /// `expected`  — class indices stored as floats, `N` elements
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> Result<f64, ShapeError> {
        let classes = class_indices(predicted, expected)?;
        let n = predicted.rows().max(1) as f64;
        let total: f64 = classes.iter().enumerate()
            .map(|(i, &t)| {
                let z = predicted.row(i);
                log_sum_exp(z) - z[t]
            })
            .sum();
        Ok(total / n)
    }

    /// Gradient w.r.t. the logits: `(softmax(z) - onehot(t)) / N`.
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Result<Tensor, ShapeError> {
        let classes = class_indices(predicted, expected)?;
        let n = predicted.rows().max(1) as f64;
        let mut data = Vec::with_capacity(predicted.len());
        for (i, &t) in classes.iter().enumerate() {
            let z = predicted.row(i);
            let lse = log_sum_exp(z);
            for (j, &zj) in z.iter().enumerate() {
                let onehot = if j == t { 1.0 } else { 0.0 };
                data.push(((zj - lse).exp() - onehot) / n);
            }
        }
        Tensor::from_vec(&predicted.shape, data)
    }
}

fn log_sum_exp(z: &[f64]) -> f64 {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + z.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn class_indices(predicted: &Tensor, expected: &Tensor) -> Result<Vec<usize>, ShapeError> {
    predicted.require_rank("cross_entropy", 2)?;
    let (n, c) = (predicted.rows(), predicted.row_len());
    if expected.len() != n {
        return Err(ShapeError::Mismatch {
            op: "cross_entropy",
            expected: vec![n],
            actual: expected.shape.clone(),
        });
    }
    expected.data.iter()
        .map(|&t| {
            if t.fract() != 0.0 || t < 0.0 || t >= c as f64 {
                Err(ShapeError::Target {
                    op: "cross_entropy",
                    reason: format!("class index {} is outside 0..{}", t, c),
                })
            } else {
                Ok(t as usize)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_c() {
        let z = Tensor::zeros(&[2, 4]);
        let t = Tensor::from_slice(&[0.0, 3.0]);
        let loss = CrossEntropyLoss::loss(&z, &t).unwrap();
        assert!((loss - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let z = Tensor::from_rows(&[vec![1.0, -2.0, 0.5], vec![0.0, 3.0, 1.0]]).unwrap();
        let t = Tensor::from_slice(&[2.0, 1.0]);
        let g = CrossEntropyLoss::derivative(&z, &t).unwrap();
        for i in 0..2 {
            assert!(g.row(i).iter().sum::<f64>().abs() < 1e-12);
        }
        assert!(g.row(0)[2] < 0.0);
    }

    #[test]
    fn large_logits_stay_finite() {
        let z = Tensor::from_rows(&[vec![1000.0, -1000.0]]).unwrap();
        let loss = CrossEntropyLoss::loss(&z, &Tensor::from_slice(&[1.0])).unwrap();
        assert!(loss.is_finite());
        assert!((loss - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_class_is_a_target_error() {
        let z = Tensor::zeros(&[1, 3]);
        let err = CrossEntropyLoss::loss(&z, &Tensor::from_slice(&[3.0])).unwrap_err();
        assert!(matches!(err, ShapeError::Target { .. }));
    }
}
