//! BSON document shapes. Identifiers are stored as hyphenated strings so the
//! documents stay readable from the mongo shell.

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    AnswerEntity, ChoiceEntity, GameEntity, PlayerEntity, QuestionEntity, QuestionKind,
    SessionEntity, SessionStatus, SubmittedAnswer, Verdict,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    description: Option<String>,
    host_id: String,
    base_points: i64,
    questions: Vec<MongoQuestion>,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoQuestion {
    id: String,
    text: String,
    kind: QuestionKind,
    time_limit_secs: i64,
    order: i32,
    media_url: Option<String>,
    choices: Vec<MongoChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoChoice {
    id: String,
    text: String,
    is_correct: bool,
    order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    code: String,
    host_id: Option<String>,
    status: SessionStatus,
    current_question_id: Option<String>,
    question_started_at: Option<DateTime>,
    version: i64,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    nickname: String,
    user_id: Option<String>,
    score: i64,
    streak: i64,
    joined_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    player_id: String,
    question_id: String,
    choice_id: Option<String>,
    submitted: SubmittedAnswer,
    time_taken_secs: f64,
    verdict: Verdict,
    points_awarded: i64,
    answered_at: DateTime,
}

pub fn id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

pub fn status_value(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Lobby => "lobby",
        SessionStatus::Running => "running",
        SessionStatus::ScoreDisplay => "score_display",
        SessionStatus::Finished => "finished",
    }
}

fn parse_id(owner: &str, value: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::Malformed {
        id: owner.to_owned(),
        reason: format!("invalid uuid `{value}`: {err}"),
    })
}

fn parse_optional_id(owner: &str, value: Option<&str>) -> Result<Option<Uuid>, MongoDaoError> {
    value.map(|raw| parse_id(owner, raw)).transpose()
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            description: value.description,
            host_id: value.host_id.to_string(),
            base_points: i64::from(value.base_points),
            questions: value.questions.into_iter().map(Into::into).collect(),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<QuestionEntity> for MongoQuestion {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            text: value.text,
            kind: value.kind,
            time_limit_secs: i64::from(value.time_limit_secs),
            order: value.order,
            media_url: value.media_url,
            choices: value
                .choices
                .into_iter()
                .map(|choice| MongoChoice {
                    id: choice.id.to_string(),
                    text: choice.text,
                    is_correct: choice.is_correct,
                    order: choice.order,
                })
                .collect(),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> Result<Self, Self::Error> {
        let owner = value.id.clone();
        let questions = value
            .questions
            .into_iter()
            .map(|question| {
                let choices = question
                    .choices
                    .into_iter()
                    .map(|choice| {
                        Ok(ChoiceEntity {
                            id: parse_id(&owner, &choice.id)?,
                            text: choice.text,
                            is_correct: choice.is_correct,
                            order: choice.order,
                        })
                    })
                    .collect::<Result<Vec<_>, MongoDaoError>>()?;
                Ok(QuestionEntity {
                    id: parse_id(&owner, &question.id)?,
                    text: question.text,
                    kind: question.kind,
                    time_limit_secs: u32::try_from(question.time_limit_secs).unwrap_or(u32::MAX),
                    order: question.order,
                    media_url: question.media_url,
                    choices,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(Self {
            id: parse_id(&owner, &value.id)?,
            title: value.title,
            description: value.description,
            host_id: parse_id(&owner, &value.host_id)?,
            base_points: u32::try_from(value.base_points).unwrap_or(0),
            questions,
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            code: value.code,
            host_id: value.host_id.map(|id| id.to_string()),
            status: value.status,
            current_question_id: value.current_question_id.map(|id| id.to_string()),
            question_started_at: value.question_started_at.map(DateTime::from_system_time),
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        let owner = value.id.clone();
        Ok(Self {
            id: parse_id(&owner, &value.id)?,
            game_id: parse_id(&owner, &value.game_id)?,
            code: value.code,
            host_id: parse_optional_id(&owner, value.host_id.as_deref())?,
            status: value.status,
            current_question_id: parse_optional_id(&owner, value.current_question_id.as_deref())?,
            question_started_at: value.question_started_at.map(DateTime::to_system_time),
            version: u64::try_from(value.version).unwrap_or(0),
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            nickname: value.nickname,
            user_id: value.user_id.map(|id| id.to_string()),
            score: value.score,
            streak: i64::from(value.streak),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl MongoPlayerDocument {
    /// Fields written only when the join upsert creates the document.
    pub fn insert_fields(&self) -> Document {
        doc! {
            "_id": self.id.clone(),
            "user_id": self.user_id.clone(),
            "score": self.score,
            "streak": self.streak,
            "joined_at": self.joined_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        let owner = value.id.clone();
        Ok(Self {
            id: parse_id(&owner, &value.id)?,
            session_id: parse_id(&owner, &value.session_id)?,
            nickname: value.nickname,
            user_id: parse_optional_id(&owner, value.user_id.as_deref())?,
            score: value.score,
            streak: u32::try_from(value.streak).unwrap_or(0),
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

impl From<AnswerEntity> for MongoAnswerDocument {
    fn from(value: AnswerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            player_id: value.player_id.to_string(),
            question_id: value.question_id.to_string(),
            choice_id: value.choice_id.map(|id| id.to_string()),
            submitted: value.submitted,
            time_taken_secs: value.time_taken_secs,
            verdict: value.verdict,
            points_awarded: value.points_awarded,
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for AnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> Result<Self, Self::Error> {
        let owner = value.id.clone();
        Ok(Self {
            id: parse_id(&owner, &value.id)?,
            session_id: parse_id(&owner, &value.session_id)?,
            player_id: parse_id(&owner, &value.player_id)?,
            question_id: parse_id(&owner, &value.question_id)?,
            choice_id: parse_optional_id(&owner, value.choice_id.as_deref())?,
            submitted: value.submitted,
            time_taken_secs: value.time_taken_secs,
            verdict: value.verdict,
            points_awarded: value.points_awarded,
            answered_at: value.answered_at.to_system_time(),
        })
    }
}
