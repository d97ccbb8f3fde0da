use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Ping the quiz store and report whether sessions can make progress.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let status = match state.store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => HealthStatus::Ok,
            Err(err) => {
                warn!(error = %err, "quiz store health check failed");
                HealthStatus::Degraded
            }
        },
        None => {
            warn!("no quiz store installed (degraded mode)");
            HealthStatus::Degraded
        }
    };
    HealthResponse::new(status, state.live_session_count())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::game_store::InMemoryQuizStore, state::AppState};

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);

        state.install_store(Arc::new(InMemoryQuizStore::new())).await;
        let health = health_status(&state).await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.live_sessions, 0);
    }
}
