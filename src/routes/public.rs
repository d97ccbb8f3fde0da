use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::public::LeaderboardResponse,
    error::{AppError, ErrorBody},
    services::public_service,
    state::SharedState,
};

/// Public read-only endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions/{code}/leaderboard", get(get_leaderboard))
}

#[utoipa::path(
    get,
    path = "/sessions/{code}/leaderboard",
    tag = "public",
    params(("code" = String, Path, description = "Join code of the session")),
    responses(
        (status = 200, description = "Ranked players", body = LeaderboardResponse),
        (status = 404, description = "Unknown join code", body = ErrorBody)
    )
)]
/// Return the players of a session in leaderboard order.
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let payload = public_service::leaderboard(&state, &code).await?;
    Ok(Json(payload))
}
