use serde::{Serialize, Deserialize};

/// Metrics of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean of the per-batch training losses.
    pub train_loss: f64,
    /// Mean of the per-batch validation losses; 0 without validation batches.
    pub val_loss: f64,
    /// Percentage of training samples whose arg-max matched the target.
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    /// Wall-clock duration of the epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Running totals for one pass over a data source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassTotals {
    pub loss_sum: f64,
    pub batches: usize,
    pub correct: usize,
    pub samples: usize,
}

impl PassTotals {
    pub fn mean_loss(&self) -> f64 {
        if self.batches == 0 { 0.0 } else { self.loss_sum / self.batches as f64 }
    }

    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { 100.0 * self.correct as f64 / self.samples as f64 }
    }
}
