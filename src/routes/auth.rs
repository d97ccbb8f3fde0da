use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, services::presence_service, state::SharedState};

/// Resolve the `Authorization: Bearer` token and expose the caller as an
/// [`UserIdentity`](crate::dao::identity::UserIdentity) request extension.
pub async fn require_user(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_owned())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    let user = presence_service::resolve_user(&state, Some(token))
        .await
        .ok_or_else(|| AppError::Unauthorized("unknown bearer token".into()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
