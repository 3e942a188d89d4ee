use crate::error::CaptureError;
use crate::http_server::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::convert::Infallible;
use tracing::{debug, info};

/// `GET /webhooks/{webhook_id}/stream`
///
/// Pushes every request captured for the webhook after the subscription was
/// made, one `data:` frame each. The subscription is dropped, and with it the
/// registry entry, when the client disconnects or the server shuts down.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
) -> Result<Response, CaptureError> {
    state.directory.lookup_webhook(&webhook_id)?;

    let subscription = state.registry.subscribe(&webhook_id);
    info!(webhook_id = %webhook_id, subscriber = ?subscription.id(), "live stream opened");

    let shutdown = state.shutdown.clone();
    let events = futures::stream::unfold(
        (subscription, shutdown),
        |(mut subscription, shutdown)| async move {
            let next = tokio::select! {
                message = subscription.recv() => message,
                _ = shutdown.cancelled() => None,
            };
            match next {
                Some(message) => {
                    let event = Event::default().data(&*message);
                    Some((Ok::<_, Infallible>(event), (subscription, shutdown)))
                }
                None => {
                    debug!(webhook_id = subscription.webhook_id(), "live stream ended by server");
                    None
                }
            }
        },
    );

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.keep_alive()));
    Ok(([(header::CONNECTION, "keep-alive")], sse).into_response())
}
