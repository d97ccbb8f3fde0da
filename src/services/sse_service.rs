use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    dao::models::SessionEntity,
    dto::sse::ServerEvent,
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Subscribe a spectator to the room of the session behind `code`.
pub async fn subscribe_spectator(
    state: &SharedState,
    code: &str,
) -> Result<(SessionEntity, broadcast::Receiver<ServerEvent>), ServiceError> {
    let session = session_service::session_by_code(state, code).await?;
    let receiver = state.rooms().subscribe_spectator(session.id);
    Ok((session, receiver))
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// releasing the room once the client disconnects.
pub fn to_sse_stream(
    state: SharedState,
    session_id: Uuid,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(session = %session_id, skipped, "spectator lagged behind");
                            continue;
                        }
                    }
                }
            }
        }

        drop(receiver);
        state.rooms().release_if_idle(session_id);
        tracing::info!(session = %session_id, "spectator stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
