use crate::network::model::ModelEntity;
use crate::train::history::TrainingHistory;

/// Messages from the training worker, in strict epoch order.
///
/// Zero or more `Progress` events are followed by exactly one terminal
/// event. Terminal events hand the model back to the receiver.
#[derive(Debug)]
pub enum TrainingEvent {
    Progress {
        epoch: usize,
        total_epochs: usize,
        progress_percent: u8,
        history: TrainingHistory,
    },
    Completed {
        history: TrainingHistory,
        model: ModelEntity,
    },
    Cancelled {
        history: TrainingHistory,
        completed_epochs: usize,
        model: ModelEntity,
    },
    /// `model` is `None` when the worker panicked.
    Failed {
        reason: String,
        model: Option<ModelEntity>,
    },
}

impl TrainingEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrainingEvent::Progress { .. })
    }
}
