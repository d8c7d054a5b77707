use serde::{Serialize, Deserialize};

use crate::train::epoch_stats::EpochStats;

/// Per-epoch metrics of a run, one entry per completed epoch in every list.
/// Accuracies are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn push(&mut self, stats: &EpochStats) {
        self.train_loss.push(stats.train_loss);
        self.val_loss.push(stats.val_loss);
        self.train_accuracy.push(stats.train_accuracy);
        self.val_accuracy.push(stats.val_accuracy);
    }

    /// Number of completed epochs recorded.
    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }
}
