use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::{
    dao::player_store::StoreSlot,
    dto::sse::{Handshake, ServerEvent},
    services::sse_events,
    state::{SharedState, SseHub},
};

/// Subscribe to the node event stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe()
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Skip lagged messages but keep the stream alive.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
        info!("SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Send the connection handshake onto the stream.
pub fn broadcast_handshake(state: &SharedState) {
    let handshake = Handshake {
        server: state.settings().server.id.clone(),
        degraded: state.store().is_degraded(),
    };
    if let Ok(event) = ServerEvent::json(Some("handshake".to_string()), &handshake) {
        let _ = state.sse().broadcast(event);
    }
}

/// Forward degraded mode changes of `slot` to the hub until the slot is dropped.
pub async fn forward_degraded_status(slot: Arc<StoreSlot>, hub: SseHub) {
    let mut watcher = slot.degraded_watcher();
    drop(slot);
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        sse_events::broadcast_system_status(&hub, degraded);
    }
}
