pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    AnswerEntity, GameEntity, PlayerEntity, SessionEntity, SessionUpdate, StreakUpdate,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::InMemoryQuizStore;

/// Abstraction over the persistence layer for quizzes and their live sessions.
///
/// Every mutating operation is atomic with respect to concurrent callers: the
/// session update is a compare-and-swap on `version`, the player join is a
/// get-or-create keyed on `(session_id, nickname)` and the answer insert is an
/// insert-if-absent keyed on `(player_id, question_id)`.
pub trait QuizStore: Send + Sync {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;

    /// Insert a new session, failing with `CodeInUse` when a non-finished
    /// session already owns the same join code.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Resolve a join code, preferring the active session when the code was reused.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Apply `update` only when the stored version still equals `expected_version`.
    ///
    /// Returns the updated record, or `None` when the version moved on.
    fn transition_session(
        &self,
        id: Uuid,
        expected_version: u64,
        update: SessionUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Return the player registered under `candidate.nickname`, creating it from
    /// `candidate` when absent. The flag is `true` when the player was created.
    fn join_player(
        &self,
        candidate: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<(PlayerEntity, bool)>>;
    fn find_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;

    /// Persist the answer and apply its points and streak update to the player.
    ///
    /// Returns `None` without touching the player when an answer already exists
    /// for the same player and question, or when the session is no longer
    /// running that question.
    fn record_answer(
        &self,
        answer: AnswerEntity,
        streak: StreakUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn count_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn list_answers(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
