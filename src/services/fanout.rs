//! Delivery of outbound game messages to sockets and spectator streams.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{GameEntity, SessionEntity},
    dto::{sse::ServerEvent, ws::OutboundMessage},
    state::SharedState,
};

/// Writer channel of the socket is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

/// Whether `user_id` is the live host of `session`.
///
/// The session's own host reference wins; the owner of the game is accepted too
/// so sessions created before host references existed keep working.
pub fn is_host(session: &SessionEntity, game: &GameEntity, user_id: Option<Uuid>) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    session.host_id == Some(user_id) || game.host_id == user_id
}

fn encode(message: &OutboundMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, kind = message.kind(), "failed to serialize outbound message");
            None
        }
    }
}

/// Push `message` to one socket.
pub fn send_to(
    tx: &mpsc::UnboundedSender<Message>,
    message: &OutboundMessage,
) -> Result<(), ConnectionClosed> {
    let Some(frame) = encode(message) else {
        return Ok(());
    };
    tx.send(frame).map_err(|_| ConnectionClosed)
}

/// Deliver `message` to every socket of the session and mirror it to spectators.
pub fn broadcast(state: &SharedState, session_id: Uuid, message: &OutboundMessage) {
    let Some(room) = state.rooms().get(session_id) else {
        return;
    };
    let Some(frame) = encode(message) else {
        return;
    };
    let delivered = room.send_all(&frame);

    match ServerEvent::from_outbound(message) {
        Ok(event) => room.spectators().broadcast(event),
        Err(err) => warn!(error = %err, "failed to mirror message to spectators"),
    }

    debug!(session = %session_id, kind = message.kind(), delivered, "broadcast");
}

/// Deliver `message` only to sockets bound to the live host of `session`.
pub fn send_to_host(
    state: &SharedState,
    session: &SessionEntity,
    game: &GameEntity,
    message: &OutboundMessage,
) -> usize {
    let Some(room) = state.rooms().get(session.id) else {
        return 0;
    };
    let Some(frame) = encode(message) else {
        return 0;
    };
    room.send_where(&frame, |subscriber| {
        is_host(session, game, subscriber.user_id)
    })
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::SessionStatus,
        dto::ws::AnsweredCountPayload,
        state::{AppState, rooms::Subscriber},
    };

    fn fixtures(host: Uuid) -> (SessionEntity, GameEntity) {
        let game = GameEntity {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: None,
            host_id: host,
            base_points: 1000,
            questions: vec![],
            created_at: SystemTime::UNIX_EPOCH,
        };
        let session = SessionEntity {
            id: Uuid::new_v4(),
            game_id: game.id,
            code: "123456".into(),
            host_id: Some(host),
            status: SessionStatus::Lobby,
            current_question_id: None,
            question_started_at: None,
            version: 0,
            created_at: SystemTime::UNIX_EPOCH,
        };
        (session, game)
    }

    #[test]
    fn host_is_matched_by_session_or_game_owner() {
        let host = Uuid::new_v4();
        let (mut session, game) = fixtures(host);
        assert!(is_host(&session, &game, Some(host)));
        assert!(!is_host(&session, &game, Some(Uuid::new_v4())));
        assert!(!is_host(&session, &game, None));

        session.host_id = None;
        assert!(is_host(&session, &game, Some(host)));
    }

    #[tokio::test]
    async fn host_only_messages_skip_players() {
        let state = AppState::new(AppConfig::default());
        let host = Uuid::new_v4();
        let (session, game) = fixtures(host);

        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let (player_tx, mut player_rx) = mpsc::unbounded_channel();
        state.rooms().join(
            session.id,
            Uuid::new_v4(),
            Subscriber {
                tx: host_tx,
                user_id: Some(host),
            },
        );
        state.rooms().join(
            session.id,
            Uuid::new_v4(),
            Subscriber {
                tx: player_tx,
                user_id: None,
            },
        );

        let message = OutboundMessage::AnsweredCount(AnsweredCountPayload { count: 1, total: 2 });
        assert_eq!(send_to_host(&state, &session, &game, &message), 1);
        assert!(host_rx.try_recv().is_ok());
        assert!(player_rx.try_recv().is_err());

        broadcast(&state, session.id, &message);
        assert!(host_rx.try_recv().is_ok());
        assert!(player_rx.try_recv().is_ok());
    }
}
