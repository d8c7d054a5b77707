use serde::Deserialize;
use tiny_http::Request;

use ferrite_workbench::{ModelArchitecture, ModelEntity, Prediction, TaskKind, Tensor};

use crate::handlers::{read_json, ApiError};
use crate::routes::{json_response, JsonResponse};
use crate::state::SharedState;
use crate::util::query::user_id;

/// `GET /models[?user_id=N]` — summaries, newest first. Without `user_id`
/// every user's models are listed.
pub fn handle_list(query: &[(String, String)], state: &SharedState) -> Result<JsonResponse, ApiError> {
    let models = state.app.store.list(user_id(query))?;
    Ok(json_response(200, &models))
}

/// `GET /models/{id}[?user_id=N]` — the stored row, architecture included.
pub fn handle_get(id: i64, query: &[(String, String)], state: &SharedState) -> Result<JsonResponse, ApiError> {
    let record = state.app.store.load_record(id, user_id(query))?;
    let architecture = ModelArchitecture::from_json(&record.architecture)?;
    Ok(json_response(200, &serde_json::json!({
        "id": record.id,
        "user_id": record.user_id,
        "name": record.name,
        "architecture": architecture,
        "weights_status": record.weights_status,
        "created_at": record.created_at,
    })))
}

#[derive(Deserialize)]
struct SaveBody {
    user_id: Option<i64>,
    name: String,
    architecture: serde_json::Value,
}

/// `POST /models` — builds the architecture and saves it with freshly
/// initialised weights.
pub fn handle_save(request: &mut Request, state: &SharedState) -> Result<JsonResponse, ApiError> {
    let body: SaveBody = read_json(request)?;
    let architecture = ModelArchitecture::from_value(body.architecture)?;
    let model = ModelEntity::build(&architecture)?;
    let id = state.app.store.save(&model, &body.name, body.user_id)?;
    Ok(json_response(201, &serde_json::json!({ "id": id, "parameters": model.parameter_count() })))
}

#[derive(Deserialize)]
struct PredictBody {
    user_id: i64,
    inputs: Vec<Vec<f64>>,
    #[serde(default = "default_task")]
    task: TaskKind,
}

fn default_task() -> TaskKind {
    TaskKind::Classification
}

/// `POST /models/{id}/predict` — runs the saved weights on `inputs` rows.
pub fn handle_predict(id: i64, request: &mut Request, state: &SharedState) -> Result<JsonResponse, ApiError> {
    let body: PredictBody = read_json(request)?;
    let store = &state.app.store;
    let record = store.load_record(id, Some(body.user_id))?;
    let mut model = store.load(id, Some(body.user_id))?;
    store.load_weights(&mut model, body.user_id, &record.name)?;

    let input = Tensor::from_rows(&body.inputs).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let prediction = model.predict(&input, body.task).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let json = match prediction {
        Prediction::Classes(classes) => serde_json::json!({ "classes": classes }),
        Prediction::Values(values) => serde_json::json!({ "shape": values.shape, "values": values.data }),
    };
    Ok(json_response(200, &json))
}
