//! Answer ingestion: grading, time-decayed scoring and host progress counts.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{AnswerEntity, PlayerEntity, SessionStatus, StreakUpdate, Verdict},
    dto::ws::{AnswerPayload, AnsweredCountPayload, OutboundMessage},
    error::ServiceError,
    services::{
        fanout,
        scoring::{self, TextMatching},
        session_service::load_game,
    },
    state::{SharedState, presence::ConnectionId},
};

/// What a stored answer earned.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub verdict: Verdict,
    pub points: i64,
    /// Player after the score and streak update.
    pub player: PlayerEntity,
}

/// Record the answer of the player bound to `connection_id` for the running question.
///
/// Only the first answer of a player per question counts; repeats, and answers
/// reaching the store after the question closed, are refused with
/// [`ServiceError::InvalidState`] and change nothing.
pub async fn submit_answer(
    state: &SharedState,
    connection_id: ConnectionId,
    payload: AnswerPayload,
) -> Result<AnswerOutcome, ServiceError> {
    let binding = state
        .presence()
        .binding(connection_id)
        .ok_or_else(|| ServiceError::InvalidState("connection is not attached to a session".into()))?;
    let player_id = binding
        .player_id
        .ok_or_else(|| ServiceError::InvalidInput("join the session before answering".into()))?;

    let store = state.require_store().await?;
    let session = store
        .find_session(binding.session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{}` not found", binding.session_id)))?;
    if session.status != SessionStatus::Running {
        return Err(ServiceError::InvalidState(format!(
            "answers are closed while the session is {:?}",
            session.status
        )));
    }
    let question_id = session
        .current_question_id
        .ok_or_else(|| ServiceError::InvalidState("no question is running".into()))?;

    let game = load_game(&store, session.game_id).await?;
    let question = game
        .question(question_id)
        .ok_or_else(|| ServiceError::InvalidState(format!("question `{question_id}` is not part of the game")))?;
    if store.find_player(session.id, player_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("player `{player_id}` not found")));
    }

    let now = SystemTime::now();
    let server_elapsed = session
        .question_started_at
        .and_then(|started| now.duration_since(started).ok())
        .unwrap_or_default()
        .as_secs_f64();
    let config = state.config();
    let time_taken = scoring::clamp_time_taken(
        payload.time_taken,
        server_elapsed,
        config.latency_allowance.as_secs_f64(),
    );
    let evaluation = scoring::evaluate(
        question,
        &payload.answer,
        TextMatching {
            max_distance: config.fuzzy_max_distance,
            min_length: config.fuzzy_min_length,
        },
    );
    let points = scoring::points(
        game.base_points,
        question.time_limit_secs,
        time_taken,
        evaluation.verdict,
    );

    let answer = AnswerEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        player_id,
        question_id,
        choice_id: evaluation.choice_id,
        submitted: payload.answer,
        time_taken_secs: time_taken,
        verdict: evaluation.verdict,
        points_awarded: points,
        answered_at: now,
    };
    // Closing the question takes the same gate, so no answer is scored after the standings went out.
    let player = state
        .with_session_gate(session.id, || async {
            let current = store
                .find_session(session.id)
                .await?
                .filter(|fresh| {
                    fresh.status == SessionStatus::Running
                        && fresh.current_question_id == Some(question_id)
                });
            if current.is_none() {
                return Err(ServiceError::InvalidState(format!(
                    "question `{question_id}` closed before the answer was recorded"
                )));
            }
            store
                .record_answer(answer, StreakUpdate::from(evaluation.verdict))
                .await?
                .ok_or_else(|| ServiceError::InvalidState("question already answered".into()))
        })
        .await?;

    info!(
        session = %session.id,
        player = %player.nickname,
        question = %question_id,
        verdict = ?evaluation.verdict,
        points,
        "answer recorded"
    );

    let count = store.count_answers(session.id, question_id).await?;
    let total = store.list_players(session.id).await?.len() as u64;
    let delivered = fanout::send_to_host(
        state,
        &session,
        &game,
        &OutboundMessage::AnsweredCount(AnsweredCountPayload { count, total }),
    );
    debug!(session = %session.id, count, total, delivered, "answered count sent");

    Ok(AnswerOutcome {
        verdict: evaluation.verdict,
        points,
        player,
    })
}
