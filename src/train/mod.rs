pub mod engine;
pub mod epoch_stats;
pub mod event;
pub mod history;
pub mod hyperparams;
pub mod loop_fn;

pub use engine::{StopHandle, TrainingEngine, TrainingState};
pub use epoch_stats::EpochStats;
pub use event::TrainingEvent;
pub use history::TrainingHistory;
pub use hyperparams::Hyperparameters;
pub use loop_fn::{progress_percent, train_loop, LoopOutcome};
