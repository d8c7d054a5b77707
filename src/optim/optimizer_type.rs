use serde::{Serialize, Deserialize};

use crate::optim::{Adam, Optimizer, RmsProp, Sgd};

/// Selects the optimizer the training loop builds for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerType {
    Sgd,
    Adam,
    #[serde(rename = "rmsprop")]
    RmsProp,
}

impl OptimizerType {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerType::Sgd => Box::new(Sgd::new(learning_rate)),
            OptimizerType::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerType::RmsProp => Box::new(RmsProp::new(learning_rate)),
        }
    }
}

impl Default for OptimizerType {
    fn default() -> Self {
        OptimizerType::Adam
    }
}
