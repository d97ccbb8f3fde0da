use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz session backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::game::create_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::get_report,
        crate::routes::public::get_leaderboard,
        crate::routes::sse::spectator_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::QuestionInput,
            crate::dto::game::ChoiceInput,
            crate::dto::game::GameDetail,
            crate::dto::game::QuestionDetail,
            crate::dto::game::ChoiceDetail,
            crate::dto::game::SessionSummary,
            crate::dto::public::LeaderboardResponse,
            crate::dto::public::LeaderboardEntry,
            crate::dto::public::DifficultyReport,
            crate::dto::public::QuestionReport,
            crate::dto::ws::LobbyUpdatePayload,
            crate::dto::ws::QuestionPayload,
            crate::dto::ws::QuestionView,
            crate::dto::ws::ChoiceView,
            crate::dto::ws::ScoreUpdatePayload,
            crate::dto::ws::AnsweredCountPayload,
            crate::dto::ws::EndPayload,
            crate::dto::ws::PlayerSummary,
            crate::dao::models::QuestionKind,
            crate::dao::models::SessionStatus,
            crate::dao::models::SubmittedAnswer,
            crate::error::ErrorBody,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Store reachability and live sessions"),
        (name = "games", description = "Quiz authoring and session creation"),
        (name = "sessions", description = "Host operations on a live session"),
        (name = "public", description = "Read-only session projections"),
        (name = "sse", description = "Spectator event streams"),
        (name = "game", description = "WebSocket protocol for hosts and players"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
