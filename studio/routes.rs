use std::io::Cursor;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::handlers::{self, ApiError};
use crate::state::SharedState;
use crate::util::query::parse_query;

pub type JsonResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn json_header() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header is valid")
}

pub fn json_response<T: Serialize>(status: u16, body: &T) -> JsonResponse {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|e| {
        format!("{{\"error\":\"failed to encode response: {}\"}}", e).into_bytes()
    });
    let len = bytes.len();
    Response::new(StatusCode(status), vec![json_header()], Cursor::new(bytes), Some(len), None)
}

pub fn error_response(status: u16, message: &str) -> JsonResponse {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found() -> JsonResponse {
    error_response(404, "not found")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches incoming requests to the appropriate handler.
///
/// Handlers borrow the request so the dispatcher can respond at the end;
/// the SSE handler takes ownership to drive a long-lived stream.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();

    let (path, query) = match url.find('?') {
        Some(pos) => (url[..pos].to_owned(), url[pos + 1..].to_owned()),
        None => (url.clone(), String::new()),
    };
    let query = parse_query(&query);

    if method == Method::Get && path == "/train/events" {
        handlers::train_sse::handle(request, state);
        return;
    }

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let result: Result<JsonResponse, ApiError> = match (&method, segments.as_slice()) {
        (Method::Post, ["users"]) => handlers::users::handle_register(&mut request, &state),

        (Method::Get, ["models"]) => handlers::models::handle_list(&query, &state),
        (Method::Post, ["models"]) => handlers::models::handle_save(&mut request, &state),
        (Method::Get, ["models", id]) => {
            parse_id(id).and_then(|id| handlers::models::handle_get(id, &query, &state))
        }
        (Method::Post, ["models", id, "predict"]) => {
            parse_id(id).and_then(|id| handlers::models::handle_predict(id, &mut request, &state))
        }

        (Method::Post, ["train", "start"]) => handlers::train::handle_start(&mut request, &state),
        (Method::Post, ["train", "stop"]) => Ok(handlers::train::handle_stop(&state)),
        (Method::Get, ["train", "status"]) => Ok(handlers::train::handle_status(&state)),

        _ => Ok(not_found()),
    };

    let response = result.unwrap_or_else(|e| error_response(e.status, &e.message));
    let _ = request.respond(response);
}

fn parse_id(segment: &str) -> Result<i64, ApiError> {
    segment.parse().map_err(|_| ApiError::bad_request(format!("'{}' is not a model id", segment)))
}
