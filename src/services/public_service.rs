//! Read-only projections served next to the live protocol: leaderboard and difficulty report.

use uuid::Uuid;

use crate::{
    dao::{
        identity::UserIdentity,
        models::{AnswerEntity, GameEntity, QuestionEntity, QuestionKind, SessionEntity, SessionStatus, Verdict},
    },
    dto::public::{DifficultyReport, LeaderboardEntry, LeaderboardResponse, QuestionReport},
    error::ServiceError,
    services::{scoring, session_service},
    state::SharedState,
};

/// Ranked players of the session behind `code`.
pub async fn leaderboard(state: &SharedState, code: &str) -> Result<LeaderboardResponse, ServiceError> {
    let session = session_service::session_by_code(state, code).await?;
    let players = state.require_store().await?.list_players(session.id).await?;

    let players = scoring::rank_players(players)
        .into_iter()
        .enumerate()
        .map(|(index, player)| LeaderboardEntry {
            rank: index + 1,
            nickname: player.nickname,
            score: player.score,
            streak: player.streak,
        })
        .collect();

    Ok(LeaderboardResponse {
        code: session.code,
        status: session.status,
        players,
    })
}

/// Per-question answer statistics of the session behind `code`, for its host only.
pub async fn difficulty_report(
    state: &SharedState,
    user: &UserIdentity,
    code: &str,
) -> Result<DifficultyReport, ServiceError> {
    let session = session_service::session_by_code(state, code).await?;
    let game = session_service::authorize_host(state, &session, Some(user.id)).await?;

    let store = state.require_store().await?;
    let total_players = store.list_players(session.id).await?.len() as u64;
    let answers = store.list_answers(session.id).await?;

    let questions = asked_questions(&game, &session)
        .iter()
        .map(|question| question_report(question, &answers, total_players))
        .collect();

    Ok(DifficultyReport {
        code: session.code,
        status: session.status,
        total_players,
        questions,
    })
}

/// Questions already put to the players, in order.
fn asked_questions<'a>(game: &'a GameEntity, session: &SessionEntity) -> &'a [QuestionEntity] {
    let asked = match session.status {
        SessionStatus::Lobby => 0,
        SessionStatus::Finished => game.questions.len(),
        SessionStatus::Running | SessionStatus::ScoreDisplay => session
            .current_question_id
            .and_then(|id| game.question_position(id))
            .map_or(0, |position| position + 1),
    };
    &game.questions[..asked]
}

fn question_report(question: &QuestionEntity, answers: &[AnswerEntity], total_players: u64) -> QuestionReport {
    let (answered, correct) = count_for(question.id, answers);
    let difficulty_index = if question.kind == QuestionKind::OpenEnded || total_players == 0 {
        None
    } else {
        Some(1.0 - correct as f64 / total_players as f64)
    };

    QuestionReport {
        question_id: question.id,
        text: question.text.clone(),
        kind: question.kind,
        order: question.order,
        answered,
        correct,
        unanswered: total_players.saturating_sub(answered),
        difficulty_index,
    }
}

fn count_for(question_id: Uuid, answers: &[AnswerEntity]) -> (u64, u64) {
    answers
        .iter()
        .filter(|answer| answer.question_id == question_id)
        .fold((0, 0), |(answered, correct), answer| {
            (
                answered + 1,
                correct + u64::from(answer.verdict == Verdict::Correct),
            )
        })
}
