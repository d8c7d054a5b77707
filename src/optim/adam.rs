use crate::layers::Param;
use crate::optim::Optimizer;

/// Adam with bias-corrected moment estimates.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    t: i32,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut Param>) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);

        for (i, param) in params.into_iter().enumerate() {
            let n = param.value.len();
            if self.m.len() <= i {
                self.m.push(vec![0.0; n]);
                self.v.push(vec![0.0; n]);
            }
            let (m, v) = (&mut self.m[i], &mut self.v[i]);
            for j in 0..n {
                let g = param.grad.data[j];
                m[j] = self.beta1 * m[j] + (1.0 - self.beta1) * g;
                v[j] = self.beta2 * v[j] + (1.0 - self.beta2) * g * g;
                let m_hat = m[j] / bc1;
                let v_hat = v[j] / bc2;
                param.value.data[j] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    #[test]
    fn first_step_has_magnitude_lr() {
        let mut p = Param::new(Tensor::from_slice(&[0.0, 0.0]));
        p.grad = Tensor::from_slice(&[3.0, -0.01]);
        Adam::new(0.01).step(vec![&mut p]);
        assert!((p.value.data[0] + 0.01).abs() < 1e-6);
        assert!((p.value.data[1] - 0.01).abs() < 1e-5);
    }
}
