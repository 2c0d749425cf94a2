/// Per-player burst suppression for progress saves.
pub mod debounce;
/// Session lifecycle dispatcher running on the primary context.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Engine handle wiring dispatcher, store and execution contexts.
pub mod engine;
/// Primary and worker execution contexts.
pub mod execution;
/// Health check service.
pub mod health_service;
/// Capabilities the hosting game server offers to the engine.
pub mod host;
/// Offline inventory edits with node-local exclusion.
pub mod offline_edit;
/// HTTP facade over offline edits.
pub mod offline_service;
/// Load and save orchestration against the player store.
pub mod orchestrator;
/// HTTP facade over live sessions.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
