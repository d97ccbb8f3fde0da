use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Quiz definition owned by a host. Sessions reference it and never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Display title of the quiz.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Identity of the user who owns the quiz.
    pub host_id: Uuid,
    /// Maximum points awarded for an instant correct answer.
    pub base_points: u32,
    /// Questions of the quiz, sorted by their `order`.
    pub questions: Vec<QuestionEntity>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
}

impl GameEntity {
    /// Look up a question by identifier.
    pub fn question(&self, id: Uuid) -> Option<&QuestionEntity> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Position of a question inside the ordered question list.
    pub fn question_position(&self, id: Uuid) -> Option<usize> {
        self.questions.iter().position(|question| question.id == id)
    }
}

/// Supported question kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Single correct choice among several.
    Choice,
    /// Two choices, one of them correct.
    TrueFalse,
    /// Choices must be submitted in their configured order.
    Puzzle,
    /// Free text compared against the correct choices' text.
    TypeAnswer,
    /// Free text that is recorded but never graded.
    OpenEnded,
}

/// One question of a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Prompt shown to the players.
    pub text: String,
    /// How answers to this question are evaluated.
    pub kind: QuestionKind,
    /// Seconds players have to answer.
    pub time_limit_secs: u32,
    /// Sequence position inside the game (lower comes first).
    pub order: i32,
    /// Optional illustration.
    pub media_url: Option<String>,
    /// Answer options in display order.
    pub choices: Vec<ChoiceEntity>,
}

/// Answer option attached to a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceEntity {
    /// Stable identifier for the choice.
    pub id: Uuid,
    /// Label shown to players (or accepted text for typed answers).
    pub text: String,
    /// Whether selecting this choice is correct.
    pub is_correct: bool,
    /// Expected position for puzzle questions; display ordering otherwise.
    pub order: i32,
}

/// Lifecycle status of a live session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players are joining; no question has been asked yet.
    Lobby,
    /// A question is active and answers are accepted.
    Running,
    /// Interim leaderboard for the last question.
    ScoreDisplay,
    /// Terminal state with final standings.
    Finished,
}

/// One live run of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Game being played.
    pub game_id: Uuid,
    /// Short numeric join code.
    pub code: String,
    /// User hosting this run.
    pub host_id: Option<Uuid>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Question currently shown (running) or just closed (score display).
    pub current_question_id: Option<Uuid>,
    /// When the current question was opened.
    pub question_started_at: Option<SystemTime>,
    /// Incremented on every transition; used for compare-and-swap updates.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Fields rewritten by a state machine transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    /// New status.
    pub status: SessionStatus,
    /// New current question pointer.
    pub current_question_id: Option<Uuid>,
    /// New question start time.
    pub question_started_at: Option<SystemTime>,
}

/// Participant of a single session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier for the player.
    pub id: Uuid,
    /// Session the player belongs to.
    pub session_id: Uuid,
    /// Nickname, unique within the session.
    pub nickname: String,
    /// Authenticated identity, if the player joined while logged in.
    pub user_id: Option<Uuid>,
    /// Accumulated points.
    pub score: i64,
    /// Consecutive correct answers.
    pub streak: u32,
    /// First join timestamp.
    pub joined_at: SystemTime,
}

/// Server-side evaluation of a submitted answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The answer matches the stored solution.
    Correct,
    /// The answer does not match.
    Incorrect,
    /// The question has no solution (open-ended).
    Ungraded,
}

/// Raw value submitted by a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    /// Display index of the selected choice.
    Index(usize),
    /// Display indices in the order the player arranged them.
    Sequence(Vec<usize>),
    /// Typed text.
    Text(String),
}

/// A player's response to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEntity {
    /// Stable identifier for the answer.
    pub id: Uuid,
    /// Session the answer was given in.
    pub session_id: Uuid,
    /// Answering player.
    pub player_id: Uuid,
    /// Question answered.
    pub question_id: Uuid,
    /// Selected choice for single-choice questions.
    pub choice_id: Option<Uuid>,
    /// Raw submission.
    pub submitted: SubmittedAnswer,
    /// Seconds the player took, after server-side clamping.
    pub time_taken_secs: f64,
    /// Outcome of the evaluation.
    pub verdict: Verdict,
    /// Points added to the player's score.
    pub points_awarded: i64,
    /// Submission timestamp.
    pub answered_at: SystemTime,
}

/// How an accepted answer changes the player's streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakUpdate {
    /// Correct answer: add one.
    Increment,
    /// Incorrect answer: back to zero.
    Reset,
    /// Ungraded answer: leave untouched.
    Keep,
}

impl StreakUpdate {
    /// Apply the update to a current streak value.
    pub fn apply(self, streak: u32) -> u32 {
        match self {
            StreakUpdate::Increment => streak.saturating_add(1),
            StreakUpdate::Reset => 0,
            StreakUpdate::Keep => streak,
        }
    }
}

impl From<Verdict> for StreakUpdate {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Correct => StreakUpdate::Increment,
            Verdict::Incorrect => StreakUpdate::Reset,
            Verdict::Ungraded => StreakUpdate::Keep,
        }
    }
}
