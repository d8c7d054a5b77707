use crate::layers::Param;
use crate::optim::Optimizer;

/// RMSprop: scales each step by a running average of squared gradients.
pub struct RmsProp {
    pub learning_rate: f64,
    pub alpha: f64,
    pub eps: f64,
    square_avg: Vec<Vec<f64>>,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> RmsProp {
        RmsProp { learning_rate, alpha: 0.99, eps: 1e-8, square_avg: Vec::new() }
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, params: Vec<&mut Param>) {
        for (i, param) in params.into_iter().enumerate() {
            let n = param.value.len();
            if self.square_avg.len() <= i {
                self.square_avg.push(vec![0.0; n]);
            }
            let avg = &mut self.square_avg[i];
            for j in 0..n {
                let g = param.grad.data[j];
                avg[j] = self.alpha * avg[j] + (1.0 - self.alpha) * g * g;
                param.value.data[j] -= self.learning_rate * g / (avg[j].sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    #[test]
    fn first_step_is_normalised() {
        let mut p = Param::new(Tensor::from_slice(&[1.0]));
        p.grad = Tensor::from_slice(&[4.0]);
        RmsProp::new(0.01).step(vec![&mut p]);
        // avg = 0.01·16, step = 0.01·4/0.4
        assert!((p.value.data[0] - 0.9).abs() < 1e-6);
    }
}
