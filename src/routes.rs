use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{self, AppState};

/// Request body cap for every `/api/v1` route.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::signup,
        handlers::signin,
        handlers::get_theme,
        handlers::put_theme,
        handlers::intake_state,
        handlers::intake_answer,
        handlers::intake_address,
        handlers::intake_redo,
        handlers::list_chats,
        handlers::get_chat,
        handlers::create_chat,
        handlers::post_message,
        handlers::operator_message,
        handlers::toggle_intervention,
        handlers::dashboard_funnel,
        handlers::dashboard_carts,
        handlers::dashboard_hots,
        handlers::dashboard_last24,
    ),
    info(title = "Vitrine Console API", description = "Admin console and chat front for the fashion assistant")
)]
pub struct ApiDoc;

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/auth/signup", post(handlers::signup))
        .route("/api/v1/auth/signin", post(handlers::signin))
        .route(
            "/api/v1/preferences/theme",
            get(handlers::get_theme).put(handlers::put_theme),
        )
        .route("/api/v1/intake", get(handlers::intake_state))
        .route("/api/v1/intake/answer", post(handlers::intake_answer))
        .route("/api/v1/intake/address", post(handlers::intake_address))
        .route("/api/v1/intake/redo", post(handlers::intake_redo))
        .route(
            "/api/v1/chats",
            get(handlers::list_chats).post(handlers::create_chat),
        )
        .route("/api/v1/chats/:id", get(handlers::get_chat))
        .route("/api/v1/chats/:id/messages", post(handlers::post_message))
        .route(
            "/api/v1/chats/:id/operator-message",
            post(handlers::operator_message),
        )
        .route(
            "/api/v1/chats/:id/intervention",
            post(handlers::toggle_intervention),
        )
        .route("/api/v1/dashboard/funnel", get(handlers::dashboard_funnel))
        .route("/api/v1/dashboard/carts", get(handlers::dashboard_carts))
        .route("/api/v1/dashboard/hots", get(handlers::dashboard_hots))
        .route("/api/v1/dashboard/last24", get(handlers::dashboard_last24))
}

/// Builds the console router.
///
/// With `rate_limited`, `/api/v1` routes get a per-IP limit of 10 req/s
/// (burst 20); the limiter keys on the peer address, so the server must be
/// started with connect info.
pub fn build_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let api = if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        api_routes().layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        )
    } else {
        api_routes().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
    };

    // Health check stays outside the rate limiter
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
