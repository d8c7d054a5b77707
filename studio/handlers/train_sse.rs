use std::thread;
use std::time::Duration;

use tiny_http::Request;

use crate::state::{RunStatus, SharedState};
use crate::util::sse::{format_sse_event, write_sse, SSE_KEEPALIVE, SSE_PREAMBLE};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `GET /train/events` — Server-Sent Events stream of the current run.
///
/// Epochs already finished are replayed first. Afterwards the handler polls
/// the shared history every 500 ms and writes:
/// - `event: epoch` with `{epoch, train_loss, val_loss, train_accuracy,
///   val_accuracy}` for every new epoch,
/// - a `: ping` comment when nothing changed,
/// - a final `done`, `stopped` or `failed` event, then closes.
pub fn handle(request: Request, state: SharedState) {
    let mut writer = request.into_writer();
    if write_sse(&mut *writer, SSE_PREAMBLE).is_err() {
        return;
    }

    let mut sent = 0;
    loop {
        let (frames, run) = {
            let st = state.state();
            let h = &st.history;
            let frames: Vec<String> = (sent..h.len())
                .map(|i| {
                    let data = serde_json::json!({
                        "epoch": i + 1,
                        "train_loss": h.train_loss[i],
                        "val_loss": h.val_loss[i],
                        "train_accuracy": h.train_accuracy[i],
                        "val_accuracy": h.val_accuracy[i],
                    });
                    format_sse_event("epoch", &data.to_string())
                })
                .collect();
            sent = h.len();
            (frames, st.run.clone())
        };

        for frame in &frames {
            if write_sse(&mut *writer, frame).is_err() {
                return;
            }
        }

        let terminal = match &run {
            RunStatus::Running { .. } => None,
            RunStatus::Done { was_stopped: true, .. } => Some("stopped"),
            RunStatus::Done { .. } | RunStatus::Idle => Some("done"),
            RunStatus::Failed { .. } => Some("failed"),
        };
        if let Some(name) = terminal {
            let data = serde_json::to_string(&run).unwrap_or_else(|_| "{}".to_owned());
            let _ = write_sse(&mut *writer, &format_sse_event(name, &data));
            return;
        }

        if frames.is_empty() && write_sse(&mut *writer, SSE_KEEPALIVE).is_err() {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
