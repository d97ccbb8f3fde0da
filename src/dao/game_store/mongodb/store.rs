use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAnswerDocument, MongoGameDocument, MongoPlayerDocument, MongoSessionDocument,
        id_filter, status_value,
    },
};
use crate::dao::{
    game_store::QuizStore,
    models::{
        AnswerEntity, GameEntity, PlayerEntity, SessionEntity, SessionStatus, SessionUpdate,
        StreakUpdate,
    },
    storage::{StorageError, StorageResult},
};

const GAME_COLLECTION: &str = "games";
const SESSION_COLLECTION: &str = "sessions";
const PLAYER_COLLECTION: &str = "players";
const ANSWER_COLLECTION: &str = "answers";
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed [`QuizStore`]. Uniqueness guarantees rely on the indexes
/// created in [`MongoQuizStore::connect`].
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document, bool); 4] = [
            (SESSION_COLLECTION, "code", doc! { "code": 1 }, false),
            (
                PLAYER_COLLECTION,
                "session_id,nickname",
                doc! { "session_id": 1, "nickname": 1 },
                true,
            ),
            (
                ANSWER_COLLECTION,
                "session_id,player_id,question_id",
                doc! { "session_id": 1, "player_id": 1, "question_id": 1 },
                true,
            ),
            (
                ANSWER_COLLECTION,
                "session_id,question_id",
                doc! { "session_id": 1, "question_id": 1 },
                false,
            ),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(Some(unique)).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database().await.collection(GAME_COLLECTION)
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION)
    }

    async fn save_game(&self, game: GameEntity) -> MongoResult<()> {
        let id = game.id;
        let document: MongoGameDocument = game.into();
        self.games()
            .await
            .replace_one(id_filter(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        Ok(())
    }

    async fn find_game(&self, id: Uuid) -> MongoResult<Option<GameEntity>> {
        let document = self
            .games()
            .await
            .find_one(id_filter(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn insert_session(&self, session: SessionEntity) -> StorageResult<()> {
        let id = session.id;
        let collection = self.sessions().await;
        let active = collection
            .find_one(doc! {
                "code": session.code.clone(),
                "status": { "$ne": status_value(SessionStatus::Finished) },
            })
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        if active.is_some() {
            return Err(StorageError::CodeInUse { code: session.code });
        }

        let document: MongoSessionDocument = session.into();
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(id_filter(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                key: id.to_string(),
                source,
            })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn find_session_by_code(&self, code: String) -> MongoResult<Option<SessionEntity>> {
        let documents: Vec<MongoSessionDocument> = self
            .sessions()
            .await
            .find(doc! { "code": code.clone() })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                key: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadSession { key: code, source })?;

        let sessions = documents
            .into_iter()
            .map(SessionEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;
        let active = sessions
            .iter()
            .position(|session| session.status != SessionStatus::Finished);
        Ok(match active {
            Some(index) => sessions.into_iter().nth(index),
            None => sessions.into_iter().next(),
        })
    }

    async fn transition_session(
        &self,
        id: Uuid,
        expected_version: u64,
        update: SessionUpdate,
    ) -> MongoResult<Option<SessionEntity>> {
        let expected = i64::try_from(expected_version).unwrap_or(i64::MAX);
        let document = self
            .sessions()
            .await
            .find_one_and_update(
                doc! { "_id": id.to_string(), "version": expected },
                doc! {
                    "$set": {
                        "status": status_value(update.status),
                        "current_question_id": update.current_question_id.map(|q| q.to_string()),
                        "question_started_at": update.question_started_at.map(DateTime::from_system_time),
                    },
                    "$inc": { "version": 1_i64 },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn join_player(&self, candidate: PlayerEntity) -> MongoResult<(PlayerEntity, bool)> {
        let session_id = candidate.session_id;
        let filter = doc! {
            "session_id": session_id.to_string(),
            "nickname": candidate.nickname.clone(),
        };
        let document: MongoPlayerDocument = candidate.into();
        let collection = self.players().await;

        let upserted = collection
            .find_one_and_update(filter.clone(), doc! { "$setOnInsert": document.insert_fields() })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        let stored = match upserted {
            Ok(stored) => stored,
            // Two concurrent upserts for the same nickname: the loser reads the winner.
            Err(err) if is_duplicate_key(&err) => collection
                .find_one(filter)
                .await
                .map_err(|source| MongoDaoError::SavePlayer { session_id, source })?,
            Err(source) => return Err(MongoDaoError::SavePlayer { session_id, source }),
        };

        let stored = stored.ok_or_else(|| MongoDaoError::Malformed {
            id: document.id().to_owned(),
            reason: "player upsert returned no document".into(),
        })?;
        let created = stored.id() == document.id();
        Ok((stored.try_into()?, created))
    }

    async fn find_player(&self, session_id: Uuid, player_id: Uuid) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc! { "_id": player_id.to_string(), "session_id": session_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { session_id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn list_players(&self, session_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "joined_at": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { session_id, source })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_answer(
        &self,
        answer: AnswerEntity,
        streak: StreakUpdate,
    ) -> MongoResult<Option<PlayerEntity>> {
        let player_id = answer.player_id;
        let session_id = answer.session_id;
        let points = answer.points_awarded;

        let open = self
            .sessions()
            .await
            .count_documents(doc! {
                "_id": session_id.to_string(),
                "status": status_value(SessionStatus::Running),
                "current_question_id": answer.question_id.to_string(),
            })
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                key: session_id.to_string(),
                source,
            })?;
        if open == 0 {
            return Ok(None);
        }
        let document: MongoAnswerDocument = answer.into();

        match self.answers().await.insert_one(&document).await {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => return Ok(None),
            Err(source) => return Err(MongoDaoError::SaveAnswer { player_id, source }),
        }

        let update = match streak {
            StreakUpdate::Increment => doc! { "$inc": { "score": points, "streak": 1_i64 } },
            StreakUpdate::Reset => doc! { "$inc": { "score": points }, "$set": { "streak": 0_i64 } },
            StreakUpdate::Keep => doc! { "$inc": { "score": points } },
        };
        let document = self
            .players()
            .await
            .find_one_and_update(
                doc! { "_id": player_id.to_string(), "session_id": session_id.to_string() },
                update,
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { session_id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn count_answers(&self, session_id: Uuid, question_id: Uuid) -> MongoResult<u64> {
        self.answers()
            .await
            .count_documents(doc! {
                "session_id": session_id.to_string(),
                "question_id": question_id.to_string(),
            })
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { session_id, source })
    }

    async fn list_answers(&self, session_id: Uuid) -> MongoResult<Vec<AnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "answered_at": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { session_id, source })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }
}

impl QuizStore for MongoQuizStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_game(game).await.map_err(Into::into) })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session_by_code(code).await.map_err(Into::into) })
    }

    fn transition_session(
        &self,
        id: Uuid,
        expected_version: u64,
        update: SessionUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_session(id, expected_version, update)
                .await
                .map_err(Into::into)
        })
    }

    fn join_player(
        &self,
        candidate: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<(PlayerEntity, bool)>> {
        let store = self.clone();
        Box::pin(async move { store.join_player(candidate).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_player(session_id, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(session_id).await.map_err(Into::into) })
    }

    fn record_answer(
        &self,
        answer: AnswerEntity,
        streak: StreakUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer, streak).await.map_err(Into::into) })
    }

    fn count_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_answers(session_id, question_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_answers(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(session_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
