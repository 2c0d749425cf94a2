use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Swagger UI at `/docs`, titled after the node it documents.
pub fn router(state: &SharedState) -> Router<SharedState> {
    let mut doc = ApiDoc::openapi();
    doc.info.title = format!("player-sync ({})", state.settings().server.id);

    SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", doc)
        .into()
}
