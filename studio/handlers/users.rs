use serde::Deserialize;
use tiny_http::Request;

use crate::handlers::{read_json, ApiError};
use crate::routes::{json_response, JsonResponse};
use crate::state::SharedState;

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
}

/// `POST /users` — `{"username": ...}` → `{"id": ...}`
pub fn handle_register(request: &mut Request, state: &SharedState) -> Result<JsonResponse, ApiError> {
    let body: RegisterBody = read_json(request)?;
    let id = state.app.store.register_user(&body.username)?;
    Ok(json_response(201, &serde_json::json!({ "id": id })))
}
