//! Background training with cancellation and typed progress events.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::data::source::BatchSource;
use crate::error::TrainingError;
use crate::network::model::ModelEntity;
use crate::train::event::TrainingEvent;
use crate::train::history::TrainingHistory;
use crate::train::hyperparams::Hyperparameters;
use crate::train::loop_fn::{progress_percent, train_loop, LoopOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Cloneable handle that asks a running worker to stop after its current epoch.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs at most one training session at a time on a dedicated thread.
///
/// The model is moved into the worker for the duration of the run and comes
/// back in the terminal event. A finished engine can be started again.
pub struct TrainingEngine {
    state: Arc<Mutex<TrainingState>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TrainingEngine {
    pub fn new() -> TrainingEngine {
        TrainingEngine {
            state: Arc::new(Mutex::new(TrainingState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> TrainingState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == TrainingState::Running
    }

    /// Starts a run and returns the event stream.
    ///
    /// Fails with `AlreadyRunning` while a previous run is in progress; the
    /// entity passed in is dropped in that case, so check `is_running` first
    /// when it must be kept.
    pub fn start(
        &mut self,
        model: ModelEntity,
        hyper: Hyperparameters,
        mut train: Box<dyn BatchSource>,
        mut validation: Box<dyn BatchSource>,
    ) -> Result<Receiver<TrainingEvent>, TrainingError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state == TrainingState::Running {
                return Err(TrainingError::AlreadyRunning);
            }
            *state = TrainingState::Running;
        }
        // The previous worker has already published its terminal state.
        if let Some(previous) = self.worker.take() {
            let _ = previous.join();
        }

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let state = Arc::clone(&self.state);
        let (tx, rx) = mpsc::channel();

        info!(
            epochs = hyper.epochs,
            learning_rate = hyper.learning_rate,
            optimizer = ?hyper.optimizer,
            loss = ?hyper.loss,
            parameters = model.parameter_count(),
            "training started"
        );

        let spawned = thread::Builder::new()
            .name("training-worker".into())
            .spawn(move || {
                let progress_tx = tx.clone();
                let result = panic::catch_unwind(AssertUnwindSafe(move || {
                    run_session(model, hyper, train.as_mut(), validation.as_mut(), &stop, &progress_tx)
                }));
                let (final_state, event) = match result {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let reason = format!("training worker panicked: {}", panic_message(payload.as_ref()));
                        error!(%reason, "training failed");
                        (TrainingState::Failed, TrainingEvent::Failed { reason, model: None })
                    }
                };
                *state.lock().unwrap_or_else(|p| p.into_inner()) = final_state;
                if tx.send(event).is_err() {
                    warn!("training finished after the event receiver was dropped");
                }
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(rx)
            }
            Err(e) => {
                *self.state.lock().unwrap_or_else(|p| p.into_inner()) = TrainingState::Failed;
                Err(TrainingError::Spawn(e))
            }
        }
    }

    /// Requests cancellation; the worker stops after the epoch in flight.
    pub fn stop(&self) {
        if self.is_running() {
            info!("training stop requested");
        }
        self.stop.store(true, Ordering::Release);
    }

    /// Handle to the engine's stop flag; valid across runs. The flag is
    /// cleared at every `start`.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Blocks until the worker thread has exited.
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Default for TrainingEngine {
    fn default() -> Self {
        TrainingEngine::new()
    }
}

impl Drop for TrainingEngine {
    fn drop(&mut self) {
        // The worker is detached; it exits after the epoch in flight.
        self.stop.store(true, Ordering::Release);
    }
}

/// Runs one session on the worker thread and builds its terminal event.
fn run_session(
    mut model: ModelEntity,
    hyper: Hyperparameters,
    train: &mut dyn BatchSource,
    validation: &mut dyn BatchSource,
    stop: &AtomicBool,
    tx: &Sender<TrainingEvent>,
) -> (TrainingState, TrainingEvent) {
    let total_epochs = hyper.epochs;
    let mut history = TrainingHistory::default();

    let result = train_loop(&mut model, &hyper, train, validation, stop, &mut history, |stats, history| {
        let event = TrainingEvent::Progress {
            epoch: stats.epoch,
            total_epochs,
            progress_percent: progress_percent(stats.epoch, total_epochs),
            history: history.clone(),
        };
        // A dropped receiver means nobody is listening any more.
        tx.send(event).is_ok()
    });

    match result {
        Ok(LoopOutcome::Completed) => {
            info!(epochs = history.len(), "training completed");
            (TrainingState::Completed, TrainingEvent::Completed { history, model })
        }
        Ok(LoopOutcome::Cancelled { completed_epochs }) => {
            info!(completed_epochs, total_epochs, "training cancelled");
            (TrainingState::Cancelled, TrainingEvent::Cancelled { history, completed_epochs, model })
        }
        Err(e) => {
            let reason = e.to_string();
            error!(%reason, "training failed");
            (TrainingState::Failed, TrainingEvent::Failed { reason, model: Some(model) })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
