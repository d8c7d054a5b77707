use std::io::Write;

/// Status line and headers for an event stream, written straight to the
/// socket because tiny_http has no streaming response body.
pub const SSE_PREAMBLE: &str = "HTTP/1.1 200 OK\r\n\
                                Content-Type: text/event-stream\r\n\
                                Cache-Control: no-cache\r\n\
                                Connection: keep-alive\r\n\
                                X-Accel-Buffering: no\r\n\
                                \r\n";

/// Formats a named SSE event with a JSON data payload.
///
/// ```text
/// event: <name>
/// data: <json>
///
/// ```
pub fn format_sse_event(event_name: &str, json_data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", event_name, json_data)
}

/// SSE comment; ignored by `EventSource` clients but keeps the connection
/// from idling out.
pub const SSE_KEEPALIVE: &str = ": ping\n\n";

/// Writes and flushes one frame. `Err` means the client went away.
pub fn write_sse<W: Write + ?Sized>(writer: &mut W, msg: &str) -> std::io::Result<()> {
    writer.write_all(msg.as_bytes())?;
    writer.flush()
}
