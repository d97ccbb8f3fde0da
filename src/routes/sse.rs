use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::{AppError, ErrorBody},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/sessions/{code}",
    tag = "sse",
    params(("code" = String, Path, description = "Join code of the session")),
    responses(
        (status = 200, description = "Spectator SSE stream mirroring room broadcasts", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown join code", body = ErrorBody)
    )
)]
/// Stream the broadcasts of a session room to a spectator screen.
pub async fn spectator_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (session, receiver) = sse_service::subscribe_spectator(&state, &code).await?;
    info!(session = %session.id, "New spectator SSE connection");
    Ok(sse_service::to_sse_stream(state, session.id, receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/sessions/{code}", get(spectator_stream))
}
