use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Countdown currently armed for a session.
#[derive(Debug, Clone)]
pub struct ActiveCountdown {
    /// Question the countdown closes on expiry.
    pub question_id: Uuid,
    generation: Uuid,
    token: CancellationToken,
}

/// Registry of per-session question countdowns.
///
/// At most one countdown exists per session. Starting a new one cancels the
/// previous; an expired countdown removes itself before running its callback,
/// so a cancelled countdown never fires.
#[derive(Debug, Clone, Default)]
pub struct TimerCoordinator {
    countdowns: Arc<DashMap<Uuid, ActiveCountdown>>,
}

impl TimerCoordinator {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a countdown for `question_id`, running `on_expire` after `duration`
    /// unless it is cancelled or replaced first.
    pub fn start<F, Fut>(&self, session_id: Uuid, question_id: Uuid, duration: Duration, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = Uuid::new_v4();
        let countdown = ActiveCountdown {
            question_id,
            generation,
            token: token.clone(),
        };

        if let Some(previous) = self.countdowns.insert(session_id, countdown) {
            previous.token.cancel();
        }

        let countdowns = self.countdowns.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(session = %session_id, question = %question_id, "countdown cancelled");
                }
                _ = sleep(duration) => {
                    let owned = countdowns
                        .remove_if(&session_id, |_, active| active.generation == generation)
                        .is_some();
                    if owned && !token.is_cancelled() {
                        debug!(session = %session_id, question = %question_id, "countdown expired");
                        on_expire().await;
                    }
                }
            }
        });
    }

    /// Cancel the session's countdown. Returns whether one was armed.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.countdowns.remove(&session_id) {
            Some((_, active)) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Question the session's countdown is armed for, if any.
    pub fn active_question(&self, session_id: Uuid) -> Option<Uuid> {
        self.countdowns
            .get(&session_id)
            .map(|active| active.question_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::future::Ready<()> + Clone) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = fired.clone();
        let callback = move || {
            handle.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        };
        (fired, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_runs_callback_once_and_clears_entry() {
        let timers = TimerCoordinator::new();
        let (session, question) = (Uuid::new_v4(), Uuid::new_v4());
        let (fired, callback) = counter();

        timers.start(session, question, Duration::from_secs(20), callback);
        assert_eq!(timers.active_question(session), Some(question));

        sleep(Duration::from_secs(21)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.active_question(session), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_fires() {
        let timers = TimerCoordinator::new();
        let session = Uuid::new_v4();
        let (fired, callback) = counter();

        timers.start(session, Uuid::new_v4(), Duration::from_secs(5), callback);
        sleep(Duration::from_secs(2)).await;
        assert!(timers.cancel(session));
        assert!(!timers.cancel(session));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_previous_countdown() {
        let timers = TimerCoordinator::new();
        let session = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let (fired_first, callback_first) = counter();
        let (fired_second, callback_second) = counter();

        timers.start(session, first, Duration::from_secs(5), callback_first);
        timers.start(session, second, Duration::from_secs(10), callback_second);
        assert_eq!(timers.active_question(session), Some(second));

        sleep(Duration::from_secs(11)).await;
        assert_eq!(fired_first.load(Ordering::SeqCst), 0);
        assert_eq!(fired_second.load(Ordering::SeqCst), 1);
    }
}
