//! HTTP surface of roomsync.
//!
//! [`build_router`] wires every route onto an [`AppState`]; `main.rs` adds
//! settings, logging and the background loops.

pub mod routes;
pub mod state;
pub mod tasks;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use state::{AppState, Backends};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_dir = state.settings.server.static_dir.clone();

    let mut app = Router::new()
        .merge(routes::health::router())
        .merge(routes::webhook::router())
        .merge(routes::sync::router())
        .merge(routes::channels::router())
        .merge(routes::bookings::router())
        .merge(routes::stats::router())
        .merge(routes::prices::router())
        .merge(routes::admin::router());

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}
