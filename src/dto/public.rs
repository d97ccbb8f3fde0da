use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{QuestionKind, SessionStatus};

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub nickname: String,
    pub score: i64,
    pub streak: u32,
}

/// Ranked players of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub code: String,
    pub status: SessionStatus,
    pub players: Vec<LeaderboardEntry>,
}

/// Per-question answer statistics.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuestionReport {
    pub question_id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    pub order: i32,
    /// Players who submitted an answer.
    pub answered: u64,
    /// Submissions graded correct.
    pub correct: u64,
    /// Players who never answered.
    pub unanswered: u64,
    /// Share of players who did not answer correctly, from 0.0 (easy) to 1.0
    /// (nobody got it). `None` for ungraded questions or sessions without players.
    pub difficulty_index: Option<f64>,
}

/// Difficulty report of a session, restricted to its host.
#[derive(Debug, Serialize, ToSchema)]
pub struct DifficultyReport {
    pub code: String,
    pub status: SessionStatus,
    pub total_players: u64,
    pub questions: Vec<QuestionReport>,
}
