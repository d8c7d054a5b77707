//! ferrite-workbench studio
//!
//! A JSON + Server-Sent-Events front end over the model store and the
//! training engine, served by a synchronous tiny_http server.
//!
//! Run with:
//!   cargo run --bin studio --release -- [config.json] [addr]
//!
//! Endpoints:
//!   POST /users                  register a user
//!   GET  /models[?user_id=N]     list saved models
//!   POST /models                 save an architecture
//!   GET  /models/{id}            fetch one model
//!   POST /models/{id}/predict    run saved weights on input rows
//!   POST /train/start            train on an uploaded CSV
//!   POST /train/stop             stop after the current epoch
//!   GET  /train/status           current run and history
//!   GET  /train/events           live progress (SSE)

mod handlers;
mod routes;
mod state;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tiny_http::Server;
use tracing::{error, info};

use ferrite_workbench::{logging, AppConfig, Workbench};

use state::Studio;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.json"));
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:7878".to_owned());

    let config = match AppConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging);

    let app = match Workbench::init(config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to initialise workbench");
            return ExitCode::FAILURE;
        }
    };
    let server = match Server::http(&addr) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind HTTP server");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "studio listening");

    let shared = Arc::new(Studio::new(app));

    // Each request gets its own thread so the SSE handler, which blocks for
    // a whole training run, does not stall other requests.
    for request in server.incoming_requests() {
        let state = Arc::clone(&shared);
        std::thread::spawn(move || routes::dispatch(request, state));
    }
    ExitCode::SUCCESS
}
