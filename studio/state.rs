use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use ferrite_workbench::{TrainingEngine, TrainingHistory, Workbench};

// ---------------------------------------------------------------------------
// Training run status
// ---------------------------------------------------------------------------

/// What the studio knows about the most recent training run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has been started since the server came up.
    Idle,
    Running {
        user_id: i64,
        name: String,
        total_epochs: usize,
    },
    /// The run ended (all epochs, or stopped early) and the model was saved.
    Done {
        model_id: i64,
        name: String,
        completed_epochs: usize,
        was_stopped: bool,
    },
    Failed {
        reason: String,
    },
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running { .. })
    }
}

// ---------------------------------------------------------------------------
// Main state struct
// ---------------------------------------------------------------------------

pub struct StudioState {
    pub engine: TrainingEngine,
    pub run: RunStatus,
    /// History of the most recent run, updated after every epoch.
    pub history: TrainingHistory,
}

/// Everything a handler may touch. The workbench is internally synchronised;
/// the training bookkeeping sits behind one mutex.
pub struct Studio {
    pub app: Workbench,
    state: Mutex<StudioState>,
}

impl Studio {
    pub fn new(app: Workbench) -> Studio {
        Studio {
            app,
            state: Mutex::new(StudioState {
                engine: TrainingEngine::new(),
                run: RunStatus::Idle,
                history: TrainingHistory::default(),
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Shared handle passed to every handler.
pub type SharedState = Arc<Studio>;
