use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{services::websocket_service, state::SharedState};

/// Optional credentials of a game socket.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SocketQuery {
    /// Bearer token identifying the host or a registered user.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws/game/{code}",
    tag = "game",
    params(("code" = String, Path, description = "Join code of the session"), SocketQuery),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a game socket for the session behind `code`.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, code, query.token))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/game/{code}", get(ws_handler))
}
