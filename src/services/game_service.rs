use std::time::SystemTime;

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        identity::UserIdentity,
        models::{GameEntity, SessionEntity, SessionStatus},
        storage::StorageError,
    },
    dto::game::{CreateGameRequest, GameDetail, SessionSummary},
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Persist a new game owned by `user`.
pub async fn create_game(
    state: &SharedState,
    user: &UserIdentity,
    request: CreateGameRequest,
) -> Result<GameDetail, ServiceError> {
    let game = request.into_entity(user.id, state.config().default_base_points);
    state.require_store().await?.save_game(game.clone()).await?;
    info!(game = %game.id, host = %user.name, questions = game.questions.len(), "game created");
    Ok(game.into())
}

/// Host view of a game, solutions included.
pub async fn get_game(
    state: &SharedState,
    user: &UserIdentity,
    id: Uuid,
) -> Result<GameDetail, ServiceError> {
    let game = owned_game(state, user, id).await?;
    Ok(game.into())
}

/// Open a new live session of game `id` under a fresh join code.
///
/// Codes are drawn at random and redrawn while they collide with a session
/// that has not finished yet.
pub async fn create_session(
    state: &SharedState,
    user: &UserIdentity,
    id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let game = owned_game(state, user, id).await?;
    let store = state.require_store().await?;
    let config = state.config();

    for attempt in 1..=config.max_join_code_attempts {
        let session = SessionEntity {
            id: Uuid::new_v4(),
            game_id: game.id,
            code: generate_join_code(config.join_code_length),
            host_id: Some(user.id),
            status: SessionStatus::Lobby,
            current_question_id: None,
            question_started_at: None,
            version: 0,
            created_at: SystemTime::now(),
        };

        match store.insert_session(session.clone()).await {
            Ok(()) => {
                info!(session = %session.id, game = %game.id, code = %session.code, "session created");
                return Ok(session.into());
            }
            Err(StorageError::CodeInUse { code }) => {
                warn!(attempt, %code, "join code collision; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::InvalidState(
        "could not allocate a free join code".into(),
    ))
}

/// REST counterpart of the `host_start` socket command.
pub async fn start_session(
    state: &SharedState,
    user: &UserIdentity,
    code: &str,
) -> Result<SessionSummary, ServiceError> {
    let session = session_service::session_by_code(state, code).await?;
    session_service::authorize_host(state, &session, Some(user.id)).await?;
    let updated = session_service::host_start(state, session.id).await?;
    Ok(updated.into())
}

async fn owned_game(
    state: &SharedState,
    user: &UserIdentity,
    id: Uuid,
) -> Result<GameEntity, ServiceError> {
    let store = state.require_store().await?;
    let game = session_service::load_game(&store, id).await?;
    if game.host_id != user.id {
        return Err(ServiceError::Forbidden(format!(
            "game `{id}` belongs to another host"
        )));
    }
    Ok(game)
}

fn generate_join_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
