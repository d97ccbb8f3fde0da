use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use axum::extract::ws::Message;
use futures::future::BoxFuture;
use quiz_session_back::{
    config::AppConfig,
    dao::{
        game_store::{InMemoryQuizStore, QuizStore},
        identity::UserIdentity,
        models::{
            AnswerEntity, GameEntity, PlayerEntity, SessionEntity, SessionStatus, SessionUpdate,
            StreakUpdate,
        },
        storage::StorageResult,
    },
    dto::{
        game::{CreateGameRequest, GameDetail, SessionSummary},
        ws::OutboundMessage,
    },
    services::{dispatcher, game_service, presence_service, public_service, session_service},
    state::{AppState, SharedState},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

const HOST_TOKEN: &str = "host-token";

struct Harness {
    state: SharedState,
    host: UserIdentity,
    game: GameDetail,
    session: SessionSummary,
}

struct Client {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        frames
    }
}

fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|frame| frame["type"] == kind).collect()
}

/// In-memory store with stalling player reads.
struct SlowLookupStore {
    inner: InMemoryQuizStore,
    /// Delay of single player lookups, between the checks of an answer and its insert.
    lookup_delay: Duration,
    /// Delay of roster reads, which feed the standings broadcasts.
    roster_delay: Duration,
}

impl SlowLookupStore {
    fn new(lookup_delay: Duration, roster_delay: Duration) -> Self {
        Self {
            inner: InMemoryQuizStore::new(),
            lookup_delay,
            roster_delay,
        }
    }
}

impl QuizStore for SlowLookupStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_game(game)
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game(id)
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_session(session)
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session(id)
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session_by_code(code)
    }

    fn transition_session(
        &self,
        id: Uuid,
        expected_version: u64,
        update: SessionUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.transition_session(id, expected_version, update)
    }

    fn join_player(
        &self,
        candidate: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<(PlayerEntity, bool)>> {
        self.inner.join_player(candidate)
    }

    fn find_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let lookup = self.inner.find_player(session_id, player_id);
        let delay = self.lookup_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            lookup.await
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let roster = self.inner.list_players(session_id);
        let delay = self.roster_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            roster.await
        })
    }

    fn record_answer(
        &self,
        answer: AnswerEntity,
        streak: StreakUpdate,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        self.inner.record_answer(answer, streak)
    }

    fn count_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.count_answers(session_id, question_id)
    }

    fn list_answers(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        self.inner.list_answers(session_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

/// Questions take `(kind, time_limit_secs)`; choice questions have index 0 correct.
async fn harness(questions: &[(&str, u32)]) -> Harness {
    harness_with(Arc::new(InMemoryQuizStore::new()), questions).await
}

async fn harness_with(store: Arc<dyn QuizStore>, questions: &[(&str, u32)]) -> Harness {
    let host = UserIdentity {
        id: Uuid::new_v4(),
        name: "Host".into(),
    };
    let config = AppConfig::default().with_user(HOST_TOKEN, host.id, host.name.clone());
    let state = AppState::new(config);
    state.install_store(store).await;

    let questions: Vec<Value> = questions
        .iter()
        .map(|(kind, limit)| {
            json!({
                "text": format!("{kind} question"),
                "kind": kind,
                "time_limit_secs": limit,
                "choices": [
                    { "text": "right", "is_correct": true },
                    { "text": "wrong" }
                ]
            })
        })
        .collect();
    let request: CreateGameRequest = serde_json::from_value(json!({
        "title": "Flow",
        "base_points": 1000,
        "questions": questions,
    }))
    .unwrap();

    let game = game_service::create_game(&state, &host, request).await.unwrap();
    let session = game_service::create_session(&state, &host, game.id)
        .await
        .unwrap();

    Harness {
        state,
        host,
        game,
        session,
    }
}

impl Harness {
    async fn connect(&self, token: Option<&str>) -> Client {
        let session = session_service::session_by_code(&self.state, &self.session.code)
            .await
            .unwrap();
        let user = presence_service::resolve_user(&self.state, token.map(str::to_owned)).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        presence_service::attach(&self.state, id, &session, user.as_ref(), tx.clone());
        session_service::resync(&self.state, session.id, user.map(|u| u.id), &tx)
            .await
            .unwrap();
        Client { id, rx }
    }

    async fn player(&self, nickname: &str) -> Client {
        let client = self.connect(None).await;
        self.send(&client, json!({ "type": "join", "payload": { "nickname": nickname } }))
            .await;
        client
    }

    async fn send(&self, client: &Client, frame: Value) {
        dispatcher::dispatch(&self.state, client.id, &frame.to_string()).await;
    }

    async fn status(&self) -> SessionStatus {
        session_service::session_by_code(&self.state, &self.session.code)
            .await
            .unwrap()
            .status
    }

    async fn scores(&self) -> Vec<(String, i64)> {
        public_service::leaderboard(&self.state, &self.session.code)
            .await
            .unwrap()
            .players
            .into_iter()
            .map(|entry| (entry.nickname, entry.score))
            .collect()
    }
}

fn answer(index: usize, time_taken: f64) -> Value {
    json!({ "type": "answer", "payload": { "answer": index, "time_taken": time_taken } })
}

fn host_start() -> Value {
    json!({ "type": "host_start", "payload": {} })
}

fn host_next() -> Value {
    json!({ "type": "host_next", "payload": {} })
}

#[tokio::test]
async fn correct_answer_at_five_seconds_scores_750_once() {
    let h = harness(&[("choice", 20)]).await;
    let mut host = h.connect(Some(HOST_TOKEN)).await;
    let mut ana = h.player("Ana").await;

    h.send(&host, host_start()).await;
    assert_eq!(h.status().await, SessionStatus::Running);
    let frames = ana.drain();
    let question = of_type(&frames, "question");
    assert_eq!(question.len(), 1);
    assert_eq!(question[0]["payload"]["time_limit"], 20);
    assert!(question[0]["payload"]["question"]["choices"][0].get("is_correct").is_none());

    h.send(&ana, answer(0, 5.0)).await;
    h.send(&ana, answer(0, 0.5)).await;

    assert_eq!(h.scores().await, vec![("Ana".to_string(), 750)]);

    let host_frames = host.drain();
    let counts = of_type(&host_frames, "answered_count");
    assert_eq!(counts.len(), 1, "duplicate answers are not counted");
    assert_eq!(counts[0]["payload"], json!({ "count": 1, "total": 1 }));
    assert!(of_type(&ana.drain(), "answered_count").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_answers_are_recorded_once() {
    let h = harness(&[("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let ana = h.player("Ana").await;
    h.send(&host, host_start()).await;

    let frame = answer(0, 5.0).to_string();
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let state = h.state.clone();
            let frame = frame.clone();
            let connection = ana.id;
            tokio::spawn(async move { dispatcher::dispatch(&state, connection, &frame).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.scores().await, vec![("Ana".to_string(), 750)]);
    let report = public_service::difficulty_report(&h.state, &h.host, &h.session.code)
        .await
        .unwrap();
    assert_eq!(report.questions[0].answered, 1);
    assert_eq!(report.questions[0].correct, 1);
}

#[tokio::test]
async fn only_the_host_can_drive_the_session() {
    let h = harness(&[("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let ana = h.player("Ana").await;

    h.send(&ana, host_start()).await;
    assert_eq!(h.status().await, SessionStatus::Lobby);

    h.send(&host, host_next()).await;
    assert_eq!(h.status().await, SessionStatus::Lobby, "host_next is ignored in the lobby");

    h.send(&host, host_start()).await;
    assert_eq!(h.status().await, SessionStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn host_advance_cancels_the_countdown() {
    let h = harness(&[("choice", 3), ("choice", 600)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let mut ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    ana.drain();

    h.send(&host, host_next()).await;
    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);
    let frames = ana.drain();
    assert_eq!(of_type(&frames, "score_update").len(), 1);
    assert!(h.state.timers().active_question(h.session.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn countdown_closes_the_question_once() {
    let h = harness(&[("choice", 3)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let mut ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    ana.drain();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);

    // Two quick clicks move one step: the second finds the session finished.
    h.send(&host, host_next()).await;
    h.send(&host, host_next()).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let frames = ana.drain();
    assert_eq!(of_type(&frames, "score_update").len(), 1);
    assert_eq!(of_type(&frames, "end").len(), 1);
    assert_eq!(h.status().await, SessionStatus::Finished);

    h.send(&ana, answer(0, 1.0)).await;
    assert_eq!(h.scores().await, vec![("Ana".to_string(), 0)]);
}

#[tokio::test]
async fn late_joiner_receives_question_with_time_left() {
    let h = harness(&[("choice", 20)]).await;
    let store = h.state.require_store().await.unwrap();
    let session = session_service::session_by_code(&h.state, &h.session.code)
        .await
        .unwrap();
    let question_id = h.game.questions[0].id;

    store
        .transition_session(
            session.id,
            session.version,
            SessionUpdate {
                status: SessionStatus::Running,
                current_question_id: Some(question_id),
                question_started_at: Some(SystemTime::now() - Duration::from_secs(5)),
            },
        )
        .await
        .unwrap()
        .unwrap();

    let mut late = h.connect(None).await;
    let frames = late.drain();
    let question = of_type(&frames, "question");
    assert_eq!(question.len(), 1);
    let remaining = question[0]["payload"]["time_remaining"].as_f64().unwrap();
    assert!((14.0..=15.5).contains(&remaining), "time_remaining = {remaining}");
    assert!(of_type(&frames, "answered_count").is_empty());

    let mut host = h.connect(Some(HOST_TOKEN)).await;
    let host_frames = host.drain();
    assert_eq!(of_type(&host_frames, "question").len(), 1);
    assert_eq!(of_type(&host_frames, "answered_count").len(), 1);
}

#[tokio::test]
async fn final_standings_after_last_question() {
    let h = harness(&[("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let mut a = h.player("A").await;
    let b = h.player("B").await;
    h.send(&host, host_start()).await;

    h.send(&a, answer(0, 5.0)).await;
    h.send(&b, answer(1, 2.0)).await;
    h.send(&host, host_next()).await;
    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);

    h.send(&host, host_next()).await;
    assert_eq!(h.status().await, SessionStatus::Finished);

    let frames = a.drain();
    let end = of_type(&frames, "end");
    assert_eq!(end.len(), 1);
    let message: OutboundMessage = serde_json::from_value(end[0].clone()).unwrap();
    let OutboundMessage::End(payload) = message else {
        panic!("expected end payload");
    };
    let standings: Vec<(String, i64)> = payload
        .players
        .into_iter()
        .map(|player| (player.nickname, player.score))
        .collect();
    assert_eq!(standings, vec![("A".to_string(), 750), ("B".to_string(), 0)]);

    // Finished admits nothing.
    h.send(&host, host_next()).await;
    h.send(&host, host_start()).await;
    assert_eq!(h.status().await, SessionStatus::Finished);
    assert!(h.state.session_snapshot(h.session.id).await.is_none());

    let mut late = h.connect(None).await;
    assert_eq!(of_type(&late.drain(), "end").len(), 1);
}

#[tokio::test]
async fn nickname_linked_to_an_account_cannot_be_taken() {
    let h = harness(&[("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    h.send(&host, json!({ "type": "join", "payload": { "nickname": "Boss" } }))
        .await;

    let mut intruder = h.player("Boss").await;
    h.send(&host, host_start()).await;
    intruder.drain();
    h.send(&intruder, answer(0, 1.0)).await;

    let report = public_service::difficulty_report(&h.state, &h.host, &h.session.code)
        .await
        .unwrap();
    assert_eq!(report.total_players, 1);
    assert_eq!(report.questions[0].answered, 0);
}

#[tokio::test]
async fn answer_racing_the_close_is_not_scored() {
    let store = Arc::new(SlowLookupStore::new(Duration::from_millis(200), Duration::ZERO));
    let h = harness_with(store, &[("choice", 20)]).await;
    let mut host = h.connect(Some(HOST_TOKEN)).await;
    let mut ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    ana.drain();
    host.drain();

    let answering = {
        let state = h.state.clone();
        let frame = answer(0, 1.0).to_string();
        let connection = ana.id;
        tokio::spawn(async move { dispatcher::dispatch(&state, connection, &frame).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(&host, host_next()).await;
    answering.await.unwrap();

    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);
    let frames = ana.drain();
    let updates = of_type(&frames, "score_update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["payload"]["players"][0]["score"], 0);
    assert_eq!(h.scores().await, vec![("Ana".to_string(), 0)]);
    assert!(of_type(&host.drain(), "answered_count").is_empty());
}

#[tokio::test]
async fn answers_during_score_display_are_dropped() {
    let h = harness(&[("choice", 20), ("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    h.send(&host, host_next()).await;
    assert_eq!(h.status().await, SessionStatus::ScoreDisplay);

    h.send(&ana, answer(0, 1.0)).await;

    assert_eq!(h.scores().await, vec![("Ana".to_string(), 0)]);
    let report = public_service::difficulty_report(&h.state, &h.host, &h.session.code)
        .await
        .unwrap();
    assert_eq!(report.questions[0].answered, 0);
}

#[tokio::test]
async fn reconnecting_player_keeps_score_and_streak() {
    let h = harness(&[("choice", 20), ("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    h.send(&ana, answer(0, 5.0)).await;
    h.send(&host, host_next()).await;

    presence_service::detach(&h.state, ana.id);
    assert!(h.state.presence().binding(ana.id).is_none());

    let mut back = h.player("Ana").await;
    let frames = back.drain();
    assert_eq!(of_type(&frames, "score_update").len(), 1);

    let board = public_service::leaderboard(&h.state, &h.session.code)
        .await
        .unwrap();
    assert_eq!(board.players.len(), 1);
    assert_eq!(board.players[0].score, 750);
    assert_eq!(board.players[0].streak, 1);

    h.send(&host, host_next()).await;
    h.send(&back, answer(0, 5.0)).await;
    assert_eq!(h.scores().await, vec![("Ana".to_string(), 1500)]);
}

#[tokio::test]
async fn resync_reflects_a_transition_that_raced_the_connect() {
    let h = harness(&[("choice", 20)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;

    let looked_up = session_service::session_by_code(&h.state, &h.session.code)
        .await
        .unwrap();
    assert_eq!(looked_up.status, SessionStatus::Lobby);
    h.send(&host, host_start()).await;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut late = Client {
        id: Uuid::new_v4(),
        rx,
    };
    presence_service::attach(&h.state, late.id, &looked_up, None, tx.clone());
    session_service::resync(&h.state, looked_up.id, None, &tx)
        .await
        .unwrap();

    let frames = late.drain();
    assert!(of_type(&frames, "lobby_update").is_empty());
    assert_eq!(of_type(&frames, "question").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_standings_still_reach_the_room() {
    let store = Arc::new(SlowLookupStore::new(Duration::ZERO, Duration::from_secs(6)));
    let h = harness_with(store, &[("choice", 600)]).await;
    let host = h.connect(Some(HOST_TOKEN)).await;
    let mut ana = h.player("Ana").await;
    h.send(&host, host_start()).await;
    ana.drain();

    let closed = session_service::host_next(&h.state, h.session.id)
        .await
        .unwrap();
    assert_eq!(closed.status, SessionStatus::ScoreDisplay);
    assert_eq!(of_type(&ana.drain(), "score_update").len(), 1);
}
