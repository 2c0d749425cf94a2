use serde::Serialize;
use utoipa::ToSchema;

/// Storage reachability as seen by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Store reachable.
    Ok,
    /// No store connection; sessions run without persistence.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Node identifier from the configuration.
    pub server: String,
    /// Sessions currently live on this node.
    pub sessions: usize,
    /// Offline edits still open.
    pub offline_edits: usize,
    /// Connected event streams.
    pub event_streams: usize,
}
