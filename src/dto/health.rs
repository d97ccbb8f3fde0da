use serde::Serialize;
use utoipa::ToSchema;

/// Whether the quiz store is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// No store installed, or the installed one failed its ping. Sessions cannot progress.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Sessions with a live transition runtime on this instance.
    pub live_sessions: usize,
}

impl HealthResponse {
    pub fn new(status: HealthStatus, live_sessions: usize) -> Self {
        Self {
            status,
            live_sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_in_snake_case() {
        let body = serde_json::to_value(HealthResponse::new(HealthStatus::Degraded, 2)).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "degraded", "live_sessions": 2 }));
    }
}
