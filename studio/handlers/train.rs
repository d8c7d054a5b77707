use std::sync::mpsc::Receiver;
use std::thread;

use serde::Deserialize;
use tiny_http::Request;
use tracing::{error, info};

use ferrite_workbench::data::parse_csv;
use ferrite_workbench::{
    Hyperparameters, InMemoryDataset, ModelArchitecture, ModelEntity, TrainingEvent,
};

use crate::handlers::{read_json, ApiError};
use crate::routes::{json_response, JsonResponse};
use crate::state::{RunStatus, SharedState};

fn default_batch_size() -> usize {
    32
}

fn default_val_split() -> f64 {
    0.2
}

#[derive(Deserialize)]
struct StartBody {
    user_id: i64,
    /// Name the trained model is saved under.
    name: String,
    /// A new architecture to train from scratch...
    architecture: Option<serde_json::Value>,
    /// ...or a saved model (owned by `user_id`) to keep training.
    model_id: Option<i64>,
    #[serde(default)]
    hyperparameters: Hyperparameters,
    /// Features followed by an integer class column.
    dataset_csv: String,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_val_split")]
    val_split: f64,
    #[serde(default)]
    shuffle: bool,
}

// ---------------------------------------------------------------------------
// POST /train/start
// ---------------------------------------------------------------------------

pub fn handle_start(request: &mut Request, state: &SharedState) -> Result<JsonResponse, ApiError> {
    let body: StartBody = read_json(request)?;
    // The trained model is saved only after the last epoch; refuse early.
    state.app.store.check_save_target(body.user_id, &body.name)?;
    let model = initial_model(&body, state)?;

    let (features, classes) = parse_csv(body.dataset_csv.as_bytes())
        .map_err(|e| ApiError::bad_request(format!("dataset: {}", e)))?;
    let dataset = InMemoryDataset::from_rows(&features, &classes, body.batch_size)
        .map_err(|e| ApiError::bad_request(format!("dataset: {}", e)))?
        .with_shuffle(body.shuffle);
    let (train, validation) = dataset.split(body.val_split);
    let (n_train, n_val) = (train.len(), validation.len());

    let events = {
        let mut st = state.state();
        if st.run.is_running() || st.engine.is_running() {
            return Err(ApiError::conflict("a training run is already in progress"));
        }
        let events = st.engine
            .start(model, body.hyperparameters, Box::new(train), Box::new(validation))
            .map_err(|e| ApiError::conflict(e.to_string()))?;
        st.run = RunStatus::Running {
            user_id: body.user_id,
            name: body.name.clone(),
            total_epochs: body.hyperparameters.epochs,
        };
        st.history = Default::default();
        events
    };

    info!(user_id = body.user_id, name = %body.name, n_train, n_val, "studio training run started");
    let pump_state = state.clone();
    let (user_id, name) = (body.user_id, body.name);
    thread::spawn(move || pump_events(events, pump_state, user_id, name));

    Ok(json_response(202, &serde_json::json!({ "train_samples": n_train, "val_samples": n_val })))
}

fn initial_model(body: &StartBody, state: &SharedState) -> Result<ModelEntity, ApiError> {
    match (&body.architecture, body.model_id) {
        (Some(arch), None) => Ok(ModelEntity::build(&ModelArchitecture::from_value(arch.clone())?)?),
        (None, Some(id)) => {
            let store = &state.app.store;
            let record = store.load_record(id, Some(body.user_id))?;
            let mut model = store.load(id, Some(body.user_id))?;
            store.load_weights(&mut model, body.user_id, &record.name)?;
            Ok(model)
        }
        _ => Err(ApiError::bad_request("provide exactly one of 'architecture' or 'model_id'")),
    }
}

/// Drains the engine's events into the shared state and saves the model
/// when the run ends.
fn pump_events(events: Receiver<TrainingEvent>, state: SharedState, user_id: i64, name: String) {
    for event in events {
        let run = match event {
            TrainingEvent::Progress { history, .. } => {
                state.state().history = history;
                continue;
            }
            TrainingEvent::Completed { history, model } => {
                let completed_epochs = history.len();
                state.state().history = history;
                save_result(&state, &model, user_id, &name, completed_epochs, false)
            }
            TrainingEvent::Cancelled { history, completed_epochs, model } => {
                state.state().history = history;
                save_result(&state, &model, user_id, &name, completed_epochs, true)
            }
            TrainingEvent::Failed { reason, .. } => RunStatus::Failed { reason },
        };
        state.state().run = run;
    }
}

fn save_result(
    state: &SharedState,
    model: &ModelEntity,
    user_id: i64,
    name: &str,
    completed_epochs: usize,
    was_stopped: bool,
) -> RunStatus {
    match state.app.store.save(model, name, Some(user_id)) {
        Ok(model_id) => RunStatus::Done { model_id, name: name.to_owned(), completed_epochs, was_stopped },
        Err(e) => {
            error!(error = %e, name, "could not save trained model");
            RunStatus::Failed { reason: format!("training finished but the model could not be saved: {}", e) }
        }
    }
}

// ---------------------------------------------------------------------------
// POST /train/stop, GET /train/status
// ---------------------------------------------------------------------------

pub fn handle_stop(state: &SharedState) -> JsonResponse {
    let st = state.state();
    let running = st.run.is_running();
    if running {
        st.engine.stop();
    }
    json_response(200, &serde_json::json!({ "stopping": running }))
}

pub fn handle_status(state: &SharedState) -> JsonResponse {
    let st = state.state();
    json_response(200, &serde_json::json!({
        "run": st.run,
        "engine": st.engine.state(),
        "history": st.history,
    }))
}
