use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{
    GameEntity, PlayerEntity, QuestionEntity, QuestionKind, SessionStatus, SubmittedAnswer,
};
use crate::dto::validation::validate_nickname;

/// Message sent to everyone once the last question has been scored.
pub const END_MESSAGE: &str = "The game is over! Showing the final standings.";

/// Why an inbound frame was not turned into a command.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid payload: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Commands accepted from game WebSocket clients, framed as `{type, payload}`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Register (or reclaim) a nickname in the session.
    Join(JoinPayload),
    /// Answer the running question.
    Answer(AnswerPayload),
    /// Host opens the first question.
    HostStart,
    /// Host closes the running question or moves past the score display.
    HostNext,
}

/// Payload of a `join` command.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct JoinPayload {
    #[validate(custom(function = "validate_nickname"))]
    pub nickname: String,
}

/// Payload of an `answer` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerPayload {
    /// Choice index, index sequence (puzzle) or text (typed answers).
    pub answer: SubmittedAnswer,
    /// Seconds the client measured between display and submission.
    #[serde(default)]
    pub time_taken: f64,
}

impl InboundMessage {
    /// Parse and validate a text frame. Host commands accept any payload.
    pub fn from_json_str(raw: &str) -> Result<Self, InboundError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        let message = match envelope.kind.as_str() {
            "join" => {
                let payload: JoinPayload = serde_json::from_value(envelope.payload)?;
                payload.validate()?;
                Self::Join(JoinPayload {
                    nickname: payload.nickname.trim().to_owned(),
                })
            }
            "answer" => Self::Answer(serde_json::from_value(envelope.payload)?),
            "host_start" => Self::HostStart,
            "host_next" => Self::HostNext,
            _ => return Err(InboundError::UnknownType(envelope.kind)),
        };
        Ok(message)
    }
}

/// Public projection of a player in rosters and leaderboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    pub nickname: String,
    pub score: i64,
    pub streak: u32,
}

impl From<&PlayerEntity> for PlayerSummary {
    fn from(value: &PlayerEntity) -> Self {
        Self {
            nickname: value.nickname.clone(),
            score: value.score,
            streak: value.streak,
        }
    }
}

/// Choice as shown to players: no correctness flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChoiceView {
    pub text: String,
}

/// Question as shown to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    pub media_url: Option<String>,
    pub order: i32,
    /// Zero-based position in the game.
    pub index: usize,
    /// Number of questions in the game.
    pub total: usize,
    pub choices: Vec<ChoiceView>,
}

impl QuestionView {
    /// Project `question` of `game`, stripping solutions.
    pub fn new(game: &GameEntity, question: &QuestionEntity) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            kind: question.kind,
            media_url: question.media_url.clone(),
            order: question.order,
            index: game.question_position(question.id).unwrap_or_default(),
            total: game.questions.len(),
            choices: question
                .choices
                .iter()
                .map(|choice| ChoiceView {
                    text: choice.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LobbyUpdatePayload {
    pub players: Vec<PlayerSummary>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuestionPayload {
    pub question: QuestionView,
    /// Seconds allotted to the question.
    pub time_limit: u32,
    /// Seconds left, derived from the persisted start time.
    pub time_remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoreUpdatePayload {
    /// Players in leaderboard order.
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnsweredCountPayload {
    pub count: u64,
    /// Players registered in the session.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndPayload {
    pub message: String,
    /// Final standings in leaderboard order.
    pub players: Vec<PlayerSummary>,
}

/// Messages pushed to game WebSocket clients, framed as `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    LobbyUpdate(LobbyUpdatePayload),
    Question(QuestionPayload),
    ScoreUpdate(ScoreUpdatePayload),
    /// Host only.
    AnsweredCount(AnsweredCountPayload),
    End(EndPayload),
}

impl OutboundMessage {
    /// Wire name of the message, reused as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LobbyUpdate(_) => "lobby_update",
            Self::Question(_) => "question",
            Self::ScoreUpdate(_) => "score_update",
            Self::AnsweredCount(_) => "answered_count",
            Self::End(_) => "end",
        }
    }
}
