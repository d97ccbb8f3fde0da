pub mod presence;
pub mod rooms;
mod sse;
pub mod state_machine;
pub mod timers;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{game_store::QuizStore, identity::IdentityProvider, models::SessionEntity},
    error::ServiceError,
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{
    presence::PresenceManager,
    rooms::RoomRegistry,
    state_machine::{SessionEvent, SessionPhase, SessionStateMachine},
    timers::TimerCoordinator,
};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Transition serialization point and cached state machine of one session.
#[derive(Default)]
pub struct SessionRuntime {
    gate: Mutex<()>,
    machine: RwLock<SessionStateMachine>,
}

/// Central application state: storage handle, routing tables and per-session runtimes.
pub struct AppState {
    store: RwLock<Option<Arc<dyn QuizStore>>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    identity: Arc<dyn IdentityProvider>,
    presence: PresenceManager,
    rooms: RoomRegistry,
    timers: TimerCoordinator,
    sessions: DashMap<Uuid, Arc<SessionRuntime>>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Tokens are resolved against the directory configured in `config`. The
    /// application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let identity = Arc::new(config.token_directory());
        Self::with_identity(config, identity)
    }

    /// Same as [`AppState::new`] with an explicit identity provider.
    pub fn with_identity(config: AppConfig, identity: Arc<dyn IdentityProvider>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            config: Arc::new(config),
            identity,
            presence: PresenceManager::new(),
            rooms: RoomRegistry::new(),
            timers: TimerCoordinator::new(),
            sessions: DashMap::new(),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn QuizStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn timers(&self) -> &TimerCoordinator {
        &self.timers
    }

    /// Runtime of `session_id`, created on first use.
    pub fn session_runtime(&self, session_id: Uuid) -> Arc<SessionRuntime> {
        self.sessions.entry(session_id).or_default().clone()
    }

    /// Number of sessions holding a transition runtime.
    pub fn live_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop the runtime of a session that reached its terminal phase.
    pub fn forget_session(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    /// Snapshot of the cached state machine of `session_id`, if it has a runtime.
    pub async fn session_snapshot(&self, session_id: Uuid) -> Option<Snapshot> {
        let runtime = self.sessions.get(&session_id)?.clone();
        let sm = runtime.machine.read().await;
        Some(sm.snapshot())
    }

    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Run `work` while holding the transition gate of `session_id`.
    ///
    /// Nothing else touching the session phase interleaves with `work`, and
    /// broadcasts of a transition reach the room either before or after it.
    pub async fn with_session_gate<F, Fut, T>(&self, session_id: Uuid, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let runtime = self.session_runtime(session_id);
        let _gate = runtime.gate.lock().await;
        work().await
    }

    /// Run one state machine transition for `session_id`.
    ///
    /// Under the session's gate the record is reloaded from the store, the
    /// machine is synced with it, `event_for` picks the event from the fresh
    /// phase and the resulting plan is handed to `work`, which persists it
    /// within the transition timeout. The plan is applied when `work` succeeds
    /// and aborted otherwise. On success `announce` runs the side effects of
    /// the new phase, still under the gate but outside the timeout.
    pub async fn run_transition<E, F, Fut, A, AFut, T>(
        &self,
        session_id: Uuid,
        event_for: E,
        work: F,
        announce: A,
    ) -> Result<(T, SessionPhase), ServiceError>
    where
        E: FnOnce(&SessionEntity, SessionPhase) -> Result<SessionEvent, ServiceError>,
        F: FnOnce(Plan, SessionEntity) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        A: FnOnce(T, SessionPhase) -> AFut,
        AFut: Future<Output = T>,
    {
        let runtime = self.session_runtime(session_id);
        let gate = runtime.gate.lock().await;

        let store = self.require_store().await?;
        let record = store
            .find_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
        let phase = SessionPhase::from_record(&record).ok_or_else(|| {
            ServiceError::InvalidState(format!("session `{session_id}` has no current question"))
        })?;
        let event = event_for(&record, phase)?;

        let plan = {
            let mut sm = runtime.machine.write().await;
            sm.sync(phase, record.version)?;
            sm.plan(event)?
        };
        let plan_id = plan.id;

        let work_future = work(plan, record);
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    // The store may still commit; the next transition resyncs from it.
                    warn!(
                        session = %session_id,
                        event = ?event,
                        plan_id = %plan_id,
                        "transition timed out before the store confirmed it"
                    );
                    if let Err(abort_err) = runtime.machine.write().await.abort(plan_id) {
                        warn!(
                            session = %session_id,
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = runtime.machine.write().await.apply(plan_id)?;
                let value = announce(value, next).await;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = runtime.machine.write().await.abort(plan_id) {
                    warn!(
                        session = %session_id,
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}
