use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the player sync node.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::events_stream,
        crate::routes::sessions::get_session,
        crate::routes::sessions::post_event,
        crate::routes::sessions::put_live_state,
        crate::routes::offline::checkout,
        crate::routes::offline::get_edit,
        crate::routes::offline::set_slot,
        crate::routes::offline::commit,
        crate::routes::offline::abandon,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::NoticeKind,
            crate::dto::sse::SessionNoticeEvent,
            crate::dto::sse::EffectsClearedEvent,
            crate::dto::sse::TransferRequestedEvent,
            crate::dto::sse::RecordLoadedEvent,
            crate::dto::session::SessionPhaseDto,
            crate::dto::session::TeleportCauseDto,
            crate::dto::session::LifecycleEventRequest,
            crate::dto::session::DispatchResponse,
            crate::dto::session::LiveStateRequest,
            crate::dto::session::LiveStateResponse,
            crate::dto::session::SessionView,
            crate::dto::offline::ViewKindDto,
            crate::dto::offline::CheckoutRequest,
            crate::dto::offline::SlotUpdateRequest,
            crate::dto::offline::OfflineEditView,
            crate::dto::offline::CommitResponse,
            crate::dao::models::PlayerSnapshot,
            crate::dao::models::ItemStack,
            crate::dao::models::Experience,
            crate::dao::models::StatusEffect,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "sessions", description = "Session lifecycle reported by the game server"),
        (name = "offline-edits", description = "Editing the stored inventory of offline players"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/events",
            "/sessions/{id}",
            "/sessions/{id}/events",
            "/sessions/{id}/state",
            "/offline-edits",
            "/offline-edits/{edit}",
            "/offline-edits/{edit}/slots/{index}",
            "/offline-edits/{edit}/commit",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} is undocumented");
        }
    }
}
