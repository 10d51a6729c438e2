//! Server-Sent Events for task lifecycle updates

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
///
/// Streams every `SplitterEvent` as it is published, with a heartbeat.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    moonarch_common::sse::create_event_sse_stream("moonarch-splitter", &state.event_bus)
}
