//! Player sync node entrypoint wiring REST, SSE, the sync engine and the storage supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, runtime::Handle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use player_sync::{
    config::SyncSettings,
    dao::{
        player_store::{InMemoryPlayerStore, PlayerStore, StoreSlot},
        storage::StorageError,
    },
    routes,
    services::{
        engine::SyncEngine,
        host::SseSessionHost,
        sse_service,
        storage_supervisor::{self, SupervisorPolicy},
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Arc::new(SyncSettings::load());
    let store = StoreSlot::new();
    let hub = AppState::default_hub();

    let host = Arc::new(SseSessionHost::new(
        hub.clone(),
        settings.proxy.transport_enabled,
    ));
    let engine = SyncEngine::start(Handle::current(), store.clone(), host, settings.clone())
        .context("starting sync engine")?;

    tokio::spawn(sse_service::forward_degraded_status(
        store.clone(),
        hub.clone(),
    ));
    spawn_store_supervisor(store.clone());

    let app_state = AppState::new(store, hub, engine.clone(), settings);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    // Save the sessions still connected and let queued saves finish before exit.
    engine.shutdown().await;
    Ok(())
}

/// Pick the backend from `PLAYER_SYNC_STORE` and supervise its connection in the background.
fn spawn_store_supervisor(slot: Arc<StoreSlot>) {
    let backend = env::var("PLAYER_SYNC_STORE").unwrap_or_else(|_| {
        warn!(
            "PLAYER_SYNC_STORE is not set; records live in this process only and are NOT shared \
             with other nodes. Set PLAYER_SYNC_STORE=mongo or couch for a cluster"
        );
        "memory".into()
    });
    let policy = SupervisorPolicy::default();

    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use player_sync::dao::player_store::mongodb::{MongoConfig, MongoPlayerStore};

            info!("using MongoDB player store");
            tokio::spawn(storage_supervisor::run(slot, policy, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoPlayerStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PlayerStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use player_sync::dao::player_store::couchdb::{CouchConfig, CouchPlayerStore};

            info!("using CouchDB player store");
            tokio::spawn(storage_supervisor::run(slot, policy, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchPlayerStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PlayerStore>)
            }));
        }
        other => {
            if other != "memory" {
                warn!(backend = %other, "unknown or disabled store backend; using in-memory store");
            }
            warn!("using the node-local in-memory player store; cross-node sync is disabled");
            tokio::spawn(storage_supervisor::run(slot, policy, || async {
                Ok::<_, StorageError>(Arc::new(InMemoryPlayerStore::new()) as Arc<dyn PlayerStore>)
            }));
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
