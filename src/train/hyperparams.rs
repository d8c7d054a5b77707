use serde::{Serialize, Deserialize};

use crate::loss::loss_type::LossType;
use crate::optim::OptimizerType;

/// Settings for one training run.
///
/// Batch size and shuffling belong to the data sources, not to the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerType,
    pub loss: LossType,
}

impl Hyperparameters {
    pub fn new(epochs: usize, learning_rate: f64, optimizer: OptimizerType, loss: LossType) -> Self {
        Hyperparameters { epochs, learning_rate, optimizer, loss }
    }
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            epochs: 10,
            learning_rate: 0.001,
            optimizer: OptimizerType::Adam,
            loss: LossType::CrossEntropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let h: Hyperparameters = serde_json::from_str(r#"{"epochs": 3, "optimizer": "rmsprop"}"#).unwrap();
        assert_eq!(h.epochs, 3);
        assert_eq!(h.optimizer, OptimizerType::RmsProp);
        assert_eq!(h.learning_rate, 0.001);
        assert_eq!(h.loss, LossType::CrossEntropy);
    }
}
