use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, post},
};

use crate::{
    dao::identity::UserIdentity,
    dto::{game::SessionSummary, public::DifficultyReport},
    error::{AppError, ErrorBody},
    routes::auth::require_user,
    services::{game_service, public_service},
    state::SharedState,
};

/// Host-only endpoints addressing a session by its join code.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/sessions/{code}/start", post(start_session))
        .route("/sessions/{code}/report", get(get_report))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

/// Open the first question, like the `host_start` socket command.
#[utoipa::path(
    post,
    path = "/sessions/{code}/start",
    tag = "sessions",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the session")),
    responses(
        (status = 200, description = "Session started", body = SessionSummary),
        (status = 403, description = "Caller does not host the session", body = ErrorBody),
        (status = 409, description = "Session already started", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Extension(user): Extension<UserIdentity>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(game_service::start_session(&state, &user, &code).await?))
}

/// Per-question difficulty statistics of a session.
#[utoipa::path(
    get,
    path = "/sessions/{code}/report",
    tag = "sessions",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the session")),
    responses(
        (status = 200, description = "Difficulty report", body = DifficultyReport),
        (status = 403, description = "Caller does not host the session", body = ErrorBody),
        (status = 404, description = "Unknown join code", body = ErrorBody)
    )
)]
pub async fn get_report(
    State(state): State<SharedState>,
    Extension(user): Extension<UserIdentity>,
    Path(code): Path<String>,
) -> Result<Json<DifficultyReport>, AppError> {
    Ok(Json(
        public_service::difficulty_report(&state, &user, &code).await?,
    ))
}
