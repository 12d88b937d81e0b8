//! Live domain events for the back-office, as server-sent events.
//!
//! Each event is named after the domain event (`order.placed`, `order.paid`
//! and so on) and carries it as JSON. A client that falls behind the
//! broadcast buffer skips the events it missed. Streams end when the server
//! begins shutting down.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::middleware::RequireAdmin;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}

async fn stream_events(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.events().subscribe();
    let shutdown = state.shutdown().clone();
    tracing::debug!(admin = %admin.email, "Event stream opened");

    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => None,
                received = receiver.recv() => Some(received),
            };
            let Some(received) = received else { break };
            match received {
                Ok(published) => match Event::default().event(published.name).json_data(&published) {
                    Ok(event) => yield Ok::<_, Infallible>(event),
                    Err(e) => tracing::warn!(error = %e, "Could not encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
