use serde::{Serialize, Deserialize};
use std::f64::consts::E;

/// Element-wise activations available as standalone layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Relu,
    Sigmoid,
    Tanh,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Relu => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::Tanh => x.tanh(),
        }
    }

    /// Derivative evaluated at the pre-activation input `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Relu => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }
}
