//! Connection attachment, identity resolution and player joins.

use std::time::SystemTime;

use axum::extract::ws::Message;
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        identity::UserIdentity,
        models::{PlayerEntity, SessionEntity, SessionStatus},
    },
    error::ServiceError,
    services::{fanout, session_service},
    state::{
        SharedState,
        presence::{ConnectionBinding, ConnectionId},
        rooms::Subscriber,
    },
};

/// Resolve an optional bearer token, bounded by the configured identity timeout.
///
/// Unknown tokens, lookups that time out and missing tokens all yield `None`:
/// the connection simply stays anonymous.
pub async fn resolve_user(state: &SharedState, token: Option<String>) -> Option<UserIdentity> {
    let token = token.filter(|token| !token.trim().is_empty())?;
    match timeout(state.config().identity_timeout, state.identity().resolve(token)).await {
        Ok(identity) => identity,
        Err(_) => {
            warn!("identity lookup timed out; continuing anonymously");
            None
        }
    }
}

/// Bind a new connection to `session` and subscribe it to the session room.
pub fn attach(
    state: &SharedState,
    connection_id: ConnectionId,
    session: &SessionEntity,
    user: Option<&UserIdentity>,
    tx: mpsc::UnboundedSender<Message>,
) {
    let user_id = user.map(|user| user.id);
    state.presence().bind(
        connection_id,
        ConnectionBinding {
            session_id: session.id,
            code: session.code.clone(),
            user_id,
            player_id: None,
        },
    );
    state.rooms().join(
        session.id,
        connection_id,
        Subscriber { tx, user_id },
    );
    info!(
        session = %session.id,
        connection = %connection_id,
        user = ?user.map(|user| user.name.as_str()),
        "connection attached"
    );
}

/// Undo [`attach`]. Players stay registered so they can reconnect.
pub fn detach(state: &SharedState, connection_id: ConnectionId) {
    if let Some(binding) = state.presence().unbind(connection_id) {
        state.rooms().leave(binding.session_id, connection_id);
        info!(session = %binding.session_id, connection = %connection_id, "connection detached");
    }
}

/// Register `nickname` for the connection, or reclaim the existing player with
/// that nickname, then broadcast the updated roster.
///
/// A player linked to another account cannot be reclaimed.
pub async fn join(
    state: &SharedState,
    connection_id: ConnectionId,
    nickname: String,
) -> Result<PlayerEntity, ServiceError> {
    let binding = state
        .presence()
        .binding(connection_id)
        .ok_or_else(|| ServiceError::InvalidState("connection is not attached to a session".into()))?;

    let store = state.require_store().await?;
    let session = store
        .find_session(binding.session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{}` not found", binding.session_id)))?;
    if session.status == SessionStatus::Finished {
        return Err(ServiceError::InvalidState(format!(
            "session `{}` is finished",
            session.code
        )));
    }

    let candidate = PlayerEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        nickname,
        user_id: binding.user_id,
        score: 0,
        streak: 0,
        joined_at: SystemTime::now(),
    };
    let (player, created) = store.join_player(candidate).await?;

    if !created && player.user_id.is_some() && player.user_id != binding.user_id {
        return Err(ServiceError::Forbidden(format!(
            "nickname `{}` belongs to another account",
            player.nickname
        )));
    }

    if !state.presence().set_player(connection_id, player.id) {
        debug!(connection = %connection_id, "connection closed while joining");
    }
    info!(
        session = %session.id,
        player = %player.nickname,
        reconnect = !created,
        "player joined"
    );

    let players = store.list_players(session.id).await?;
    fanout::broadcast(
        state,
        session.id,
        &session_service::lobby_update(&session, players),
    );

    Ok(player)
}
