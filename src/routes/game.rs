use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::identity::UserIdentity,
    dto::game::{CreateGameRequest, GameDetail, SessionSummary},
    error::{AppError, ErrorBody},
    routes::auth::require_user,
    services::game_service,
    state::SharedState,
};

/// Host-only routes to author games and open sessions.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/sessions", post(create_session))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

/// Create a quiz definition owned by the caller.
#[utoipa::path(
    post,
    path = "/games",
    tag = "games",
    request_body = CreateGameRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Game created", body = GameDetail),
        (status = 400, description = "Invalid game definition", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody)
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Extension(user): Extension<UserIdentity>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<(StatusCode, Json<GameDetail>), AppError> {
    let game = game_service::create_game(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// Retrieve a game with its solutions. Restricted to its host.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "games",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game", body = GameDetail),
        (status = 403, description = "Caller does not host the game", body = ErrorBody),
        (status = 404, description = "Unknown game", body = ErrorBody)
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Extension(user): Extension<UserIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameDetail>, AppError> {
    Ok(Json(game_service::get_game(&state, &user, id).await?))
}

/// Open a live session of the game and return its join code.
#[utoipa::path(
    post,
    path = "/games/{id}/sessions",
    tag = "games",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 201, description = "Session created in the lobby", body = SessionSummary),
        (status = 403, description = "Caller does not host the game", body = ErrorBody),
        (status = 409, description = "No free join code", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Extension(user): Extension<UserIdentity>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let session = game_service::create_session(&state, &user, id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}
