//! School API server library logic.

pub mod api;
pub mod api_courses;
pub mod api_students;
pub mod config;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod startup;

use axum::{Extension, Router};
use middleware::HttpsRedirection;
use school_db::SchoolDbContext;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pooled data-access context.
    pub db: SchoolDbContext,
    /// HTTPS redirection settings.
    pub https: HttpsRedirection,
    /// Bearer tokens accepted on authorized routes.
    pub api_keys: Arc<[String]>,
    /// Whether the Swagger UI and OpenAPI document are mounted.
    pub enable_docs: bool,
}

/// Builds the application router.
///
/// Request pipeline, outermost first: request tracing, documentation routes
/// (Development only), HTTPS redirection, routing, per-route authorization,
/// controller handlers.
pub fn app(state: AppState) -> Router {
    let routes = routes::controller_routes();

    let router = routes::build_router(&routes)
        .layer(axum::middleware::from_fn(middleware::https_redirect_middleware));

    // Merged after the redirect layer so documentation is served as-is.
    let router = if state.enable_docs {
        tracing::info!(path = openapi::UI_PATH, "serving API documentation");
        router.merge(openapi::docs_router(&routes))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
