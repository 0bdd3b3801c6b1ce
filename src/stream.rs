use futures::StreamExt;
use std::convert::Infallible;

use crate::pipeline::{EventStream, StepEvent};

/// Encode one event as a newline-terminated JSON record.
pub fn encode_line(event: &StepEvent) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Decode one wire line back into an event. Unknown fields are tolerated.
pub fn decode_line(line: &str) -> Result<StepEvent, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}

/// Adapt a pipeline's event stream to NDJSON frames for an HTTP body. Each
/// event becomes exactly one line, delivered in emission order; nothing is
/// buffered past a single event.
pub fn ndjson_frames(
    events: EventStream,
) -> impl futures::Stream<Item = Result<String, Infallible>> + Send {
    events.map(|event| {
        let line = encode_line(&event).unwrap_or_else(|e| {
            // StepEvent serialization is infallible in practice; keep the
            // stream alive with a diagnostic line if that ever changes.
            log::error!("failed to encode stream event: {e}");
            "{\"error\":\"internal encoding failure\"}\n".to_string()
        });
        Ok(line)
    })
}
