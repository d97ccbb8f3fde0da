//! Routes parsed WebSocket commands to the services that handle them.

use tracing::{debug, warn};

use crate::{
    dto::ws::InboundMessage,
    error::ServiceError,
    services::{answer_service, presence_service, session_service},
    state::{SharedState, presence::ConnectionId},
};

/// Handle one inbound text frame of `connection_id`.
///
/// Malformed frames, unknown types and refused commands are logged and
/// dropped; the socket stays open.
pub async fn dispatch(state: &SharedState, connection_id: ConnectionId, raw: &str) {
    let message = match InboundMessage::from_json_str(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!(connection = %connection_id, error = %err, "dropping inbound frame");
            return;
        }
    };

    let result = match message {
        InboundMessage::Join(payload) => presence_service::join(state, connection_id, payload.nickname)
            .await
            .map(drop),
        InboundMessage::Answer(payload) => answer_service::submit_answer(state, connection_id, payload)
            .await
            .map(drop),
        InboundMessage::HostStart => host_command(state, connection_id, HostCommand::Start).await,
        InboundMessage::HostNext => host_command(state, connection_id, HostCommand::Next).await,
    };

    if let Err(err) = result {
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                warn!(connection = %connection_id, error = %err, "command failed");
            }
            _ => debug!(connection = %connection_id, error = %err, "command dropped"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum HostCommand {
    Start,
    Next,
}

async fn host_command(
    state: &SharedState,
    connection_id: ConnectionId,
    command: HostCommand,
) -> Result<(), ServiceError> {
    let binding = state
        .presence()
        .binding(connection_id)
        .ok_or_else(|| ServiceError::InvalidState("connection is not attached to a session".into()))?;
    let session = state
        .require_store()
        .await?
        .find_session(binding.session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{}` not found", binding.session_id)))?;

    // Checked against the stored session on every command, never cached.
    session_service::authorize_host(state, &session, binding.user_id).await?;

    match command {
        HostCommand::Start => session_service::host_start(state, session.id).await?,
        HostCommand::Next => session_service::host_next(state, session.id).await?,
    };
    Ok(())
}
