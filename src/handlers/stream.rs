use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{stream::BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, Result};

/// Turns a snapshot stream into server-sent events: each snapshot becomes a
/// `snapshot` event, a failure becomes a single `error` event that ends the
/// stream. The client reconnects for a fresh snapshot. Cancelling
/// `shutdown` ends the stream so graceful shutdown can drain the connection.
pub fn snapshot_events<T>(
    snapshots: BoxStream<'static, Result<T>>,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
{
    let events = snapshots
        .scan(false, |failed, item| {
            if *failed {
                return futures::future::ready(None);
            }
            let event = match item {
                Ok(snapshot) => Event::default()
                    .event("snapshot")
                    .json_data(json!({ "data": snapshot }))
                    .unwrap_or_else(|e| error_event(&AppError::Internal(e.into()))),
                Err(e) => {
                    *failed = true;
                    tracing::error!("Subscription failed: {}", e);
                    error_event(&e)
                }
            };
            futures::future::ready(Some(Ok(event)))
        })
        .take_until(async move { shutdown.cancelled().await });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn error_event(error: &AppError) -> Event {
    Event::default().event("error").data(
        json!({
            "code": error.code(),
            "retryable": error.is_retryable(),
        })
        .to_string(),
    )
}
