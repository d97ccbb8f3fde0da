//! Host-driven session lifecycle: start, close, advance and resync.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use axum::extract::ws::Message;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::QuizStore,
        models::{GameEntity, PlayerEntity, QuestionEntity, SessionEntity, SessionStatus},
    },
    dto::{
        validation::validate_join_code,
        ws::{
            AnsweredCountPayload, END_MESSAGE, EndPayload, LobbyUpdatePayload, OutboundMessage,
            PlayerSummary, QuestionPayload, QuestionView, ScoreUpdatePayload,
        },
    },
    error::ServiceError,
    services::{fanout, scoring},
    state::{
        Plan, SharedState,
        state_machine::{CloseReason, SessionEvent, SessionPhase},
    },
};

/// Look a session up by its join code.
pub async fn session_by_code(state: &SharedState, code: &str) -> Result<SessionEntity, ServiceError> {
    let code = code.trim();
    if validate_join_code(code).is_err() || code.len() != state.config().join_code_length {
        return Err(ServiceError::NotFound(format!("no session with code `{code}`")));
    }
    state
        .require_store()
        .await?
        .find_session_by_code(code.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no session with code `{code}`")))
}

/// Load the game a session plays.
pub async fn load_game(store: &Arc<dyn QuizStore>, game_id: Uuid) -> Result<GameEntity, ServiceError> {
    store
        .find_game(game_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))
}

/// Load the game of `session` and check that `user_id` hosts it.
pub async fn authorize_host(
    state: &SharedState,
    session: &SessionEntity,
    user_id: Option<Uuid>,
) -> Result<GameEntity, ServiceError> {
    let store = state.require_store().await?;
    let game = load_game(&store, session.game_id).await?;
    if fanout::is_host(session, &game, user_id) {
        Ok(game)
    } else {
        Err(ServiceError::Forbidden(format!(
            "only the host can drive session `{}`",
            session.code
        )))
    }
}

/// Open the first question of a session waiting in the lobby.
///
/// A game without questions goes straight to the final standings.
pub async fn host_start(state: &SharedState, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_store().await?;
    let session = find_session(&store, session_id).await?;
    if session.status != SessionStatus::Lobby {
        return Err(ServiceError::InvalidState(format!(
            "session `{}` has already started",
            session.code
        )));
    }
    let game = load_game(&store, session.game_id).await?;
    let first = game.questions.first().map(|question| question.id);

    let shared = state.clone();
    let writer = store.clone();
    let (updated, phase) = state
        .run_transition(
            session_id,
            |_, _| Ok(SessionEvent::HostStart { first }),
            move |plan, record| persist(writer, plan, record),
            move |updated, phase| announce(shared, store, game, updated, phase),
        )
        .await?;

    info!(session = %session_id, phase = ?phase, "session started");
    finish_if_terminal(state, session_id, phase);
    Ok(updated)
}

/// Host advance: close the running question, or leave the score display.
///
/// The command acts on the phase the session was in when it arrived. If the
/// countdown closed the question in the meantime the command is refused, so a
/// single click never skips the score display.
pub async fn host_next(state: &SharedState, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_store().await?;
    let session = find_session(&store, session_id).await?;
    let observed = SessionPhase::from_record(&session).ok_or_else(|| {
        ServiceError::InvalidState(format!("session `{session_id}` has no current question"))
    })?;
    if observed == SessionPhase::Finished {
        return Err(ServiceError::InvalidState(format!(
            "session `{}` is finished",
            session.code
        )));
    }
    let game = load_game(&store, session.game_id).await?;

    if matches!(observed, SessionPhase::Running { .. }) {
        state.timers().cancel(session_id);
    }

    let next_of = game.clone();
    let shared = state.clone();
    let writer = store.clone();
    let (updated, phase) = state
        .run_transition(
            session_id,
            move |_, phase| {
                if phase != observed {
                    return Err(ServiceError::InvalidState(format!(
                        "session `{session_id}` moved on before the host command"
                    )));
                }
                match phase {
                    SessionPhase::Running { question_id } => Ok(SessionEvent::CloseQuestion {
                        question_id,
                        reason: CloseReason::HostAdvance,
                    }),
                    SessionPhase::ScoreDisplay { question_id } => Ok(SessionEvent::Advance {
                        next: next_question(&next_of, question_id),
                    }),
                    SessionPhase::Lobby => Err(ServiceError::InvalidState(
                        "host_next is ignored in the lobby".into(),
                    )),
                    SessionPhase::Finished => Err(ServiceError::InvalidState(format!(
                        "session `{session_id}` is finished"
                    ))),
                }
            },
            move |plan, record| persist(writer, plan, record),
            move |updated, phase| announce(shared, store, game, updated, phase),
        )
        .await?;

    debug!(session = %session_id, phase = ?phase, "host advanced session");
    finish_if_terminal(state, session_id, phase);
    Ok(updated)
}

/// Countdown expiry: close `question_id` if it is still the running question.
pub async fn expire_question(state: &SharedState, session_id: Uuid, question_id: Uuid) {
    let loaded = match state.require_store().await {
        Ok(store) => match find_session(&store, session_id).await {
            Ok(session) => load_game(&store, session.game_id)
                .await
                .map(|game| (store, game)),
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    };
    let (store, game) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => {
            warn!(session = %session_id, error = %err, "countdown expired but session could not be loaded");
            return;
        }
    };

    let shared = state.clone();
    let writer = store.clone();
    let result = state
        .run_transition(
            session_id,
            |_, _| {
                Ok(SessionEvent::CloseQuestion {
                    question_id,
                    reason: CloseReason::Timeout,
                })
            },
            move |plan, record| persist(writer, plan, record),
            move |updated, phase| announce(shared, store, game, updated, phase),
        )
        .await;

    match result {
        Ok((_, phase)) => {
            debug!(session = %session_id, question = %question_id, "question closed by countdown");
            finish_if_terminal(state, session_id, phase);
        }
        // The host closed the question first.
        Err(ServiceError::InvalidState(reason)) => {
            debug!(session = %session_id, question = %question_id, %reason, "stale countdown ignored");
        }
        Err(err) => {
            warn!(session = %session_id, question = %question_id, error = %err, "countdown transition failed");
        }
    }
}

fn expire_question_task(state: SharedState, session_id: Uuid, question_id: Uuid) -> BoxFuture<'static, ()> {
    Box::pin(async move { expire_question(&state, session_id, question_id).await })
}

/// Bring a freshly attached connection up to date and return the number of frames sent.
///
/// The session is read again under its gate, so a transition racing the
/// connection either lands before the read or broadcasts after the resync
/// frames, never in between.
pub async fn resync(
    state: &SharedState,
    session_id: Uuid,
    user_id: Option<Uuid>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<usize, ServiceError> {
    let (status, sent) = state
        .with_session_gate(session_id, || async {
            let (session, messages) = resync_messages(state, session_id, user_id).await?;
            let mut sent = 0;
            for message in &messages {
                if fanout::send_to(tx, message).is_err() {
                    break;
                }
                sent += 1;
            }
            Ok::<_, ServiceError>((session.status, sent))
        })
        .await?;
    if status == SessionStatus::Finished {
        state.forget_session(session_id);
    }
    Ok(sent)
}

/// Fresh record of `session_id` and the messages describing its current phase.
pub async fn resync_messages(
    state: &SharedState,
    session_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<(SessionEntity, Vec<OutboundMessage>), ServiceError> {
    let store = state.require_store().await?;
    let session = find_session(&store, session_id).await?;
    let game = load_game(&store, session.game_id).await?;
    let phase = SessionPhase::from_record(&session).ok_or_else(|| {
        ServiceError::InvalidState(format!("session `{}` has no current question", session.id))
    })?;
    let players = store.list_players(session.id).await?;

    let messages = match phase {
        SessionPhase::Lobby => vec![lobby_update(&session, players)],
        SessionPhase::Running { question_id } => {
            let question = question_of(&game, question_id)?;
            let started_at = session.question_started_at.unwrap_or_else(SystemTime::now);
            let mut messages = vec![question_message(&game, question, started_at, SystemTime::now())];
            if fanout::is_host(&session, &game, user_id) {
                let count = store.count_answers(session.id, question_id).await?;
                messages.push(OutboundMessage::AnsweredCount(AnsweredCountPayload {
                    count,
                    total: players.len() as u64,
                }));
            }
            messages
        }
        SessionPhase::ScoreDisplay { .. } => vec![score_update(players)],
        SessionPhase::Finished => vec![end(players)],
    };
    Ok((session, messages))
}

/// Roster broadcast while players join, in join order.
pub fn lobby_update(session: &SessionEntity, mut players: Vec<PlayerEntity>) -> OutboundMessage {
    players.sort_by_key(|player| player.joined_at);
    OutboundMessage::LobbyUpdate(LobbyUpdatePayload {
        players: players.iter().map(PlayerSummary::from).collect(),
        status: session.status,
    })
}

pub fn score_update(players: Vec<PlayerEntity>) -> OutboundMessage {
    OutboundMessage::ScoreUpdate(ScoreUpdatePayload {
        players: summaries(players),
    })
}

pub fn end(players: Vec<PlayerEntity>) -> OutboundMessage {
    OutboundMessage::End(EndPayload {
        message: END_MESSAGE.to_owned(),
        players: summaries(players),
    })
}

/// Question frame with the time left derived from the persisted start time.
pub fn question_message(
    game: &GameEntity,
    question: &QuestionEntity,
    started_at: SystemTime,
    now: SystemTime,
) -> OutboundMessage {
    let elapsed = now.duration_since(started_at).unwrap_or_default().as_secs_f64();
    let time_limit = question.time_limit_secs;
    OutboundMessage::Question(QuestionPayload {
        question: QuestionView::new(game, question),
        time_limit,
        time_remaining: (f64::from(time_limit) - elapsed).max(0.0),
    })
}

fn summaries(players: Vec<PlayerEntity>) -> Vec<PlayerSummary> {
    scoring::rank_players(players)
        .iter()
        .map(PlayerSummary::from)
        .collect()
}

fn next_question(game: &GameEntity, current: Uuid) -> Option<Uuid> {
    let position = game.question_position(current)?;
    game.questions.get(position + 1).map(|question| question.id)
}

fn question_of(game: &GameEntity, question_id: Uuid) -> Result<&QuestionEntity, ServiceError> {
    game.question(question_id).ok_or_else(|| {
        ServiceError::InvalidState(format!(
            "question `{question_id}` is not part of game `{}`",
            game.id
        ))
    })
}

async fn find_session(store: &Arc<dyn QuizStore>, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

fn finish_if_terminal(state: &SharedState, session_id: Uuid, phase: SessionPhase) {
    if phase == SessionPhase::Finished {
        state.timers().cancel(session_id);
        state.forget_session(session_id);
        info!(session = %session_id, "session finished");
    }
}

/// Persist the planned phase with a compare-and-set on the record version.
async fn persist(
    store: Arc<dyn QuizStore>,
    plan: Plan,
    record: SessionEntity,
) -> Result<SessionEntity, ServiceError> {
    let update = plan.to.update(record.question_started_at, SystemTime::now());
    store
        .transition_session(record.id, record.version, update)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState(format!("session `{}` changed concurrently", record.id))
        })
}

/// Side effects of entering `phase`: countdown and room broadcasts.
async fn announce(
    state: SharedState,
    store: Arc<dyn QuizStore>,
    game: GameEntity,
    updated: SessionEntity,
    phase: SessionPhase,
) -> SessionEntity {
    match phase {
        SessionPhase::Running { question_id } => {
            let question = match question_of(&game, question_id) {
                Ok(question) => question,
                Err(err) => {
                    warn!(session = %updated.id, error = %err, "running question missing from game");
                    return updated;
                }
            };
            let started_at = updated.question_started_at.unwrap_or_else(SystemTime::now);
            let timer_state = state.clone();
            let session_id = updated.id;
            state.timers().start(
                session_id,
                question_id,
                Duration::from_secs(u64::from(question.time_limit_secs)),
                move || expire_question_task(timer_state, session_id, question_id),
            );
            fanout::broadcast(
                &state,
                updated.id,
                &question_message(&game, question, started_at, started_at),
            );
        }
        SessionPhase::ScoreDisplay { .. } => {
            state.timers().cancel(updated.id);
            announce_standings(&state, &store, &updated, score_update).await;
        }
        SessionPhase::Finished => {
            state.timers().cancel(updated.id);
            announce_standings(&state, &store, &updated, end).await;
        }
        SessionPhase::Lobby => {}
    }
    updated
}

async fn announce_standings(
    state: &SharedState,
    store: &Arc<dyn QuizStore>,
    session: &SessionEntity,
    build: fn(Vec<PlayerEntity>) -> OutboundMessage,
) {
    match store.list_players(session.id).await {
        Ok(players) => fanout::broadcast(state, session.id, &build(players)),
        Err(err) => {
            warn!(session = %session.id, error = %err, "failed to load standings for broadcast")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{ChoiceEntity, QuestionKind};

    fn game_with(limits: &[u32]) -> GameEntity {
        GameEntity {
            id: Uuid::new_v4(),
            title: "quiz".into(),
            description: None,
            host_id: Uuid::new_v4(),
            base_points: 1000,
            questions: limits
                .iter()
                .enumerate()
                .map(|(order, limit)| QuestionEntity {
                    id: Uuid::new_v4(),
                    text: format!("q{order}"),
                    kind: QuestionKind::Choice,
                    time_limit_secs: *limit,
                    order: order as i32,
                    media_url: None,
                    choices: vec![ChoiceEntity {
                        id: Uuid::new_v4(),
                        text: "a".into(),
                        is_correct: true,
                        order: 0,
                    }],
                })
                .collect(),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn next_question_follows_order() {
        let game = game_with(&[20, 20]);
        assert_eq!(
            next_question(&game, game.questions[0].id),
            Some(game.questions[1].id)
        );
        assert_eq!(next_question(&game, game.questions[1].id), None);
        assert_eq!(next_question(&game, Uuid::new_v4()), None);
    }

    #[test]
    fn question_message_reports_time_left() {
        let game = game_with(&[20]);
        let started = SystemTime::UNIX_EPOCH;
        let message = question_message(
            &game,
            &game.questions[0],
            started,
            started + Duration::from_secs(5),
        );
        let OutboundMessage::Question(payload) = message else {
            panic!("expected a question frame");
        };
        assert_eq!(payload.time_limit, 20);
        assert_eq!(payload.time_remaining, 15.0);
        assert!(payload.question.choices.iter().all(|c| c.text == "a"));

        let late = question_message(
            &game,
            &game.questions[0],
            started,
            started + Duration::from_secs(60),
        );
        let OutboundMessage::Question(payload) = late else {
            panic!("expected a question frame");
        };
        assert_eq!(payload.time_remaining, 0.0);
    }
}
