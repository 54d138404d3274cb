//! Server-Sent Events streaming for the long-running stages.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use repurpose_common::events::spawn_stage;
use repurpose_common::{EventSink, Result, StageEvent};
use serde::Serialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

/// Run `stage` on its own task and stream its events as `data:` frames.
/// The stream ends after the terminal event.
pub fn stream_stage<E, F, Fut>(stage: F) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    E: StageEvent + Serialize,
    F: FnOnce(EventSink<E>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<E::Output>> + Send + 'static,
{
    let rx = spawn_stage(stage);
    let stream = UnboundedReceiverStream::new(rx).filter_map(|event| match serde_json::to_string(&event) {
        Ok(data) => Some(Ok(Event::default().data(data))),
        Err(e) => {
            warn!(error = %e, "Dropping unserializable event");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
