// Route definitions

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod api;

pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/catalog", get(api::get_catalog))
        .route("/catalog/page", get(api::get_catalog_page))
        .route("/canonical", get(api::get_canonical))
        .with_state(app_state);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
}
