use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI JSON.
pub mod docs;
/// Health check.
pub mod health;
/// Offline inventory edits.
pub mod offline;
/// Session lifecycle reported by the game server.
pub mod sessions;
/// Server-sent events stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(sessions::router())
        .merge(offline::router());

    let docs_router = docs::router(&state);

    api_router.merge(docs_router).with_state(state)
}
