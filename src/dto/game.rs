use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{
        ChoiceEntity, GameEntity, QuestionEntity, QuestionKind, SessionEntity, SessionStatus,
    },
    dto::format_system_time,
};

/// Time limit applied when a question omits it.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 20;

/// Payload used to create a quiz definition.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Points for an instant correct answer. Defaults to the server setting.
    #[serde(default)]
    #[validate(range(min = 1, max = 100_000))]
    pub base_points: Option<u32>,
    #[validate(nested)]
    pub questions: Vec<QuestionInput>,
}

/// Incoming question definition.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QuestionInput {
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    /// Sequence position; defaults to the position in the request.
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceInput>,
}

/// Incoming answer option.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChoiceInput {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    /// Expected puzzle position; defaults to the position in the request.
    #[serde(default)]
    pub order: Option<i32>,
}

fn invalid(code: &'static str, message: impl Into<String>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into().into());
    err
}

impl Validate for QuestionInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.text.trim().is_empty() {
            errors.add("text", invalid("question_text", "question text must not be empty"));
        }

        if self
            .time_limit_secs
            .is_some_and(|limit| !(1..=600).contains(&limit))
        {
            errors.add(
                "time_limit_secs",
                invalid("time_limit", "time limit must be between 1 and 600 seconds"),
            );
        }

        if self
            .media_url
            .as_ref()
            .is_some_and(|url| !validator::ValidateUrl::validate_url(url))
        {
            errors.add("media_url", invalid("media_url", "media url must be a valid URL"));
        }

        if self.choices.iter().any(|choice| choice.text.trim().is_empty()) {
            errors.add("choices", invalid("choice_text", "choice text must not be empty"));
        }

        let correct = self.choices.iter().filter(|choice| choice.is_correct).count();
        let shape = match self.kind {
            QuestionKind::Choice if self.choices.len() < 2 || correct != 1 => {
                Some("choice questions need at least two choices and exactly one correct")
            }
            QuestionKind::TrueFalse if self.choices.len() != 2 || correct != 1 => {
                Some("true/false questions need exactly two choices, one of them correct")
            }
            QuestionKind::Puzzle if self.choices.len() < 2 => {
                Some("puzzle questions need at least two choices")
            }
            QuestionKind::TypeAnswer if correct == 0 => {
                Some("typed answer questions need at least one accepted answer")
            }
            _ => None,
        };
        if let Some(message) = shape {
            errors.add("choices", invalid("question_shape", message));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl CreateGameRequest {
    /// Build the stored definition owned by `host_id`, questions sorted by order.
    pub fn into_entity(self, host_id: Uuid, default_base_points: u32) -> GameEntity {
        let mut questions: Vec<QuestionEntity> = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(position, question)| QuestionEntity {
                id: Uuid::new_v4(),
                text: question.text.trim().to_owned(),
                kind: question.kind,
                time_limit_secs: question.time_limit_secs.unwrap_or(DEFAULT_TIME_LIMIT_SECS),
                order: question.order.unwrap_or(position as i32),
                media_url: question.media_url,
                choices: question
                    .choices
                    .into_iter()
                    .enumerate()
                    .map(|(index, choice)| ChoiceEntity {
                        id: Uuid::new_v4(),
                        text: choice.text.trim().to_owned(),
                        is_correct: choice.is_correct,
                        order: choice.order.unwrap_or(index as i32),
                    })
                    .collect(),
            })
            .collect();
        questions.sort_by_key(|question| question.order);

        GameEntity {
            id: Uuid::new_v4(),
            title: self.title.trim().to_owned(),
            description: self.description,
            host_id,
            base_points: self.base_points.unwrap_or(default_base_points),
            questions,
            created_at: SystemTime::now(),
        }
    }
}

/// Host view of a game, solutions included.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameDetail {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub host_id: Uuid,
    pub base_points: u32,
    pub created_at: String,
    pub questions: Vec<QuestionDetail>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionDetail {
    pub id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    pub time_limit_secs: u32,
    pub order: i32,
    pub media_url: Option<String>,
    pub choices: Vec<ChoiceDetail>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChoiceDetail {
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
    pub order: i32,
}

impl From<GameEntity> for GameDetail {
    fn from(game: GameEntity) -> Self {
        Self {
            id: game.id,
            title: game.title,
            description: game.description,
            host_id: game.host_id,
            base_points: game.base_points,
            created_at: format_system_time(game.created_at),
            questions: game
                .questions
                .into_iter()
                .map(|question| QuestionDetail {
                    id: question.id,
                    text: question.text,
                    kind: question.kind,
                    time_limit_secs: question.time_limit_secs,
                    order: question.order,
                    media_url: question.media_url,
                    choices: question
                        .choices
                        .into_iter()
                        .map(|choice| ChoiceDetail {
                            id: choice.id,
                            text: choice.text,
                            is_correct: choice.is_correct,
                            order: choice.order,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Session returned to the host after creation.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub game_id: Uuid,
    /// Join code players type to enter the session.
    pub code: String,
    pub status: SessionStatus,
    pub created_at: String,
}

impl From<SessionEntity> for SessionSummary {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            game_id: session.game_id,
            code: session.code,
            status: session.status,
            created_at: format_system_time(session.created_at),
        }
    }
}
