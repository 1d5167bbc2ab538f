//! API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        .nest("/api", admin_routes())
        .with_state(state)
}

/// Pool administration, settings and fetch
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/proxies",
            get(handlers::proxy::list_proxies)
                .post(handlers::proxy::add_proxies)
                .delete(handlers::proxy::remove_proxy),
        )
        .route("/proxies/blacklist", post(handlers::proxy::blacklist_proxy))
        .route(
            "/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route("/fetch", post(handlers::fetch::fetch))
}
