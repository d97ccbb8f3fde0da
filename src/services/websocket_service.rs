use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    services::{dispatcher, presence_service, session_service},
    state::SharedState,
};

/// Drive a game socket opened for join code `code`.
///
/// Unknown codes close the socket right away. Otherwise the connection is
/// attached to the session room, brought up to date with the current phase and
/// then fed every inbound text frame until the client leaves.
pub async fn handle_socket(state: SharedState, socket: WebSocket, code: String, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let session = match session_service::session_by_code(&state, &code).await {
        Ok(session) => session,
        Err(err) => {
            info!(%code, error = %err, "rejecting socket for unknown session");
            let _ = outbound_tx.send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "unknown session".into(),
            })));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let user = presence_service::resolve_user(&state, token).await;
    let connection_id = Uuid::new_v4();
    presence_service::attach(&state, connection_id, &session, user.as_ref(), outbound_tx.clone());

    let user_id = user.as_ref().map(|user| user.id);
    match session_service::resync(&state, session.id, user_id, &outbound_tx).await {
        Ok(sent) => debug!(connection = %connection_id, sent, "connection resynced"),
        Err(err) => warn!(connection = %connection_id, error = %err, "failed to resync connection"),
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection = %connection_id, payload = %text, "received game message");
                dispatcher::dispatch(&state, connection_id, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    presence_service::detach(&state, connection_id);
    finalize(writer_task, outbound_tx).await;
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
