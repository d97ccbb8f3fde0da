use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    game_store::QuizStore,
    models::{
        AnswerEntity, GameEntity, PlayerEntity, SessionEntity, SessionStatus, SessionUpdate,
        StreakUpdate,
    },
    storage::{StorageError, StorageResult},
};

/// Process-local store used when no database is configured, and by tests.
///
/// A single lock guards every table so each trait operation is atomic.
#[derive(Clone, Default)]
pub struct InMemoryQuizStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    games: HashMap<Uuid, GameEntity>,
    sessions: HashMap<Uuid, SessionEntity>,
    players: HashMap<Uuid, PlayerEntity>,
    answers: HashMap<(Uuid, Uuid), AnswerEntity>,
}

impl InMemoryQuizStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuizStore for InMemoryQuizStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.games.insert(game.id, game);
            Ok(())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.games.get(&id).cloned()) })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.write().await;
            let taken = tables.sessions.values().any(|existing| {
                existing.code == session.code && existing.status != SessionStatus::Finished
            });
            if taken {
                return Err(StorageError::CodeInUse { code: session.code });
            }
            tables.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.sessions.get(&id).cloned()) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.read().await;
            let found = tables
                .sessions
                .values()
                .filter(|session| session.code == code)
                .max_by_key(|session| {
                    (session.status != SessionStatus::Finished, session.created_at)
                })
                .cloned();
            Ok(found)
        })
    }

    fn transition_session(
        &self,
        id: Uuid,
        expected_version: u64,
        update: SessionUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.write().await;
            let Some(session) = tables.sessions.get_mut(&id) else {
                return Ok(None);
            };
            if session.version != expected_version {
                return Ok(None);
            }
            session.status = update.status;
            session.current_question_id = update.current_question_id;
            session.question_started_at = update.question_started_at;
            session.version += 1;
            Ok(Some(session.clone()))
        })
    }

    fn join_player(
        &self,
        candidate: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<(PlayerEntity, bool)>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.write().await;
            if let Some(existing) = tables.players.values().find(|player| {
                player.session_id == candidate.session_id && player.nickname == candidate.nickname
            }) {
                return Ok((existing.clone(), false));
            }
            tables.players.insert(candidate.id, candidate.clone());
            Ok((candidate, true))
        })
    }

    fn find_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .read()
                .await
                .players
                .get(&player_id)
                .filter(|player| player.session_id == session_id)
                .cloned())
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.read().await;
            let mut players: Vec<PlayerEntity> = tables
                .players
                .values()
                .filter(|player| player.session_id == session_id)
                .cloned()
                .collect();
            players.sort_by_key(|player| player.joined_at);
            Ok(players)
        })
    }

    fn record_answer(
        &self,
        answer: AnswerEntity,
        streak: StreakUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.write().await;
            let open = tables.sessions.get(&answer.session_id).is_some_and(|session| {
                session.status == SessionStatus::Running
                    && session.current_question_id == Some(answer.question_id)
            });
            let key = (answer.player_id, answer.question_id);
            if !open || tables.answers.contains_key(&key) {
                return Ok(None);
            }
            let Some(player) = tables.players.get_mut(&answer.player_id) else {
                return Ok(None);
            };
            player.score += answer.points_awarded;
            player.streak = streak.apply(player.streak);
            let updated = player.clone();
            tables.answers.insert(key, answer);
            Ok(Some(updated))
        })
    }

    fn count_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.read().await;
            let count = tables
                .answers
                .values()
                .filter(|answer| answer.session_id == session_id && answer.question_id == question_id)
                .count();
            Ok(count as u64)
        })
    }

    fn list_answers(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.read().await;
            let mut answers: Vec<AnswerEntity> = tables
                .answers
                .values()
                .filter(|answer| answer.session_id == session_id)
                .cloned()
                .collect();
            answers.sort_by_key(|answer| answer.answered_at);
            Ok(answers)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{SubmittedAnswer, Verdict};

    fn session(code: &str, status: SessionStatus) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            code: code.into(),
            host_id: None,
            status,
            current_question_id: None,
            question_started_at: None,
            version: 0,
            created_at: SystemTime::now(),
        }
    }

    fn player(session_id: Uuid, nickname: &str) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            session_id,
            nickname: nickname.into(),
            user_id: None,
            score: 0,
            streak: 0,
            joined_at: SystemTime::now(),
        }
    }

    fn answer(session_id: Uuid, player_id: Uuid, question_id: Uuid, points: i64) -> AnswerEntity {
        AnswerEntity {
            id: Uuid::new_v4(),
            session_id,
            player_id,
            question_id,
            choice_id: None,
            submitted: SubmittedAnswer::Index(0),
            time_taken_secs: 1.0,
            verdict: Verdict::Correct,
            points_awarded: points,
            answered_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn active_code_cannot_be_reused() {
        let store = InMemoryQuizStore::new();
        store
            .insert_session(session("123456", SessionStatus::Lobby))
            .await
            .unwrap();

        let err = store
            .insert_session(session("123456", SessionStatus::Lobby))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::CodeInUse { .. }));
    }

    #[tokio::test]
    async fn finished_code_can_be_reused_and_lookup_prefers_active() {
        let store = InMemoryQuizStore::new();
        let old = session("654321", SessionStatus::Finished);
        let fresh = session("654321", SessionStatus::Lobby);
        store.insert_session(old).await.unwrap();
        store.insert_session(fresh.clone()).await.unwrap();

        let found = store
            .find_session_by_code("654321".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, fresh.id);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryQuizStore::new();
        let record = session("111111", SessionStatus::Lobby);
        store.insert_session(record.clone()).await.unwrap();

        let update = SessionUpdate {
            status: SessionStatus::Running,
            current_question_id: Some(Uuid::new_v4()),
            question_started_at: Some(SystemTime::now()),
        };
        let first = store
            .transition_session(record.id, 0, update.clone())
            .await
            .unwrap();
        assert_eq!(first.unwrap().version, 1);

        let second = store.transition_session(record.id, 0, update).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn join_is_idempotent_per_nickname() {
        let store = InMemoryQuizStore::new();
        let session_id = Uuid::new_v4();

        let (first, created) = store.join_player(player(session_id, "ana")).await.unwrap();
        assert!(created);
        let (again, created_again) = store.join_player(player(session_id, "ana")).await.unwrap();
        assert!(!created_again);
        assert_eq!(first.id, again.id);
        assert_eq!(store.list_players(session_id).await.unwrap().len(), 1);
    }

    async fn running_session(store: &InMemoryQuizStore, question_id: Uuid) -> SessionEntity {
        let mut record = session("222222", SessionStatus::Running);
        record.current_question_id = Some(question_id);
        record.question_started_at = Some(SystemTime::now());
        store.insert_session(record.clone()).await.unwrap();
        record
    }

    #[tokio::test]
    async fn concurrent_duplicate_answers_award_points_once() {
        let store = InMemoryQuizStore::new();
        let question_id = Uuid::new_v4();
        let session_id = running_session(&store, question_id).await.id;
        let (player, _) = store.join_player(player(session_id, "bob")).await.unwrap();

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            let answer = answer(session_id, player.id, question_id, 750);
            tokio::spawn(async move { store.record_answer(answer, StreakUpdate::Increment).await })
        });
        let results = futures::future::join_all(attempts).await;
        let accepted = results
            .into_iter()
            .filter(|result| matches!(result, Ok(Ok(Some(_)))))
            .count();

        assert_eq!(accepted, 1);
        let stored = store.find_player(session_id, player.id).await.unwrap().unwrap();
        assert_eq!(stored.score, 750);
        assert_eq!(stored.streak, 1);
        assert_eq!(store.count_answers(session_id, question_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn answers_for_a_closed_question_are_refused() {
        let store = InMemoryQuizStore::new();
        let question_id = Uuid::new_v4();
        let record = running_session(&store, question_id).await;
        let (player, _) = store.join_player(player(record.id, "eve")).await.unwrap();

        store
            .transition_session(
                record.id,
                record.version,
                SessionUpdate {
                    status: SessionStatus::ScoreDisplay,
                    current_question_id: Some(question_id),
                    question_started_at: record.question_started_at,
                },
            )
            .await
            .unwrap()
            .unwrap();

        let late = store
            .record_answer(answer(record.id, player.id, question_id, 900), StreakUpdate::Increment)
            .await
            .unwrap();
        assert!(late.is_none());
        let stored = store.find_player(record.id, player.id).await.unwrap().unwrap();
        assert_eq!(stored.score, 0);
        assert_eq!(store.count_answers(record.id, question_id).await.unwrap(), 0);
    }
}
