//! Library crate for player-sync, exposing modules for the node binary and the OpenAPI generator.

pub mod config;
/// Player record models and storage backends.
pub mod dao;
/// HTTP request and response payloads.
pub mod dto;
/// HTTP-facing error type.
pub mod error;
/// Axum route trees.
pub mod routes;
/// Engine, dispatcher and the services behind the routes.
pub mod services;
/// Shared application state, session registry and the state machine.
pub mod state;
