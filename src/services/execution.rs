//! The two execution contexts of the engine.
//!
//! The *primary* context is a single dedicated thread that owns a context value `C` and runs
//! every task against it in submission order. Anything that touches live session state runs
//! there. The *worker* context is the tokio runtime; store I/O runs there and hands results
//! back to the primary context through the same queue.

use std::{
    future::Future,
    io,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle as ThreadJoinHandle},
    time::Duration,
};

use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error};

type PrimaryTask<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

enum PrimaryMessage<C> {
    Run(PrimaryTask<C>),
    Shutdown,
}

/// The primary context is no longer accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("primary context has stopped")]
pub struct PrimaryStopped;

/// Cloneable handle used to move work between the primary and worker contexts.
pub struct ExecutionBridge<C> {
    primary: mpsc::UnboundedSender<PrimaryMessage<C>>,
    worker: Handle,
}

impl<C> Clone for ExecutionBridge<C> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            worker: self.worker.clone(),
        }
    }
}

impl<C: 'static> ExecutionBridge<C> {
    /// Queue `task` on the primary context. Returns `false` once the context stopped.
    pub fn run_on_primary<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.primary
            .send(PrimaryMessage::Run(Box::new(task)))
            .is_ok()
    }

    /// Queue `task` on the primary context after `delay`.
    pub fn run_on_primary_after<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let bridge = self.clone();
        self.worker.spawn(async move {
            tokio::time::sleep(delay).await;
            if !bridge.run_on_primary(task) {
                debug!(?delay, "delayed task dropped; primary context stopped");
            }
        });
    }

    /// Run `task` on the primary context and wait for its result from async code.
    pub async fn call_primary<R, F>(&self, task: F) -> Result<R, PrimaryStopped>
    where
        R: Send + 'static,
        F: FnOnce(&mut C) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if !self.run_on_primary(move |context| {
            let _ = tx.send(task(context));
        }) {
            return Err(PrimaryStopped);
        }
        rx.await.map_err(|_| PrimaryStopped)
    }

    /// Run `future` on the worker pool.
    pub fn run_on_worker<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.worker.spawn(future)
    }

    /// Run `future` on the worker pool, then hand its output to `then` on the primary context.
    pub fn run_on_worker_then_primary<F, T>(&self, future: F, then: T)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        T: FnOnce(&mut C, F::Output) + Send + 'static,
    {
        let bridge = self.clone();
        self.worker.spawn(async move {
            let output = future.await;
            if !bridge.run_on_primary(move |context| then(context, output)) {
                debug!("worker completion dropped; primary context stopped");
            }
        });
    }

    /// Run `future` on the worker pool and block the calling thread until it completes.
    ///
    /// Must be called from the primary context (or any thread outside the runtime).
    pub fn block_on_worker<F>(&self, future: F) -> Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.worker.spawn(future);
        self.worker.block_on(handle)
    }

    /// Stop the primary context once the tasks already queued have run.
    pub fn shutdown(&self) {
        let _ = self.primary.send(PrimaryMessage::Shutdown);
    }

    /// Whether the primary context stopped accepting work.
    pub fn is_stopped(&self) -> bool {
        self.primary.is_closed()
    }
}

/// Join handle of the primary thread.
pub struct PrimaryThread {
    join: ThreadJoinHandle<()>,
}

impl PrimaryThread {
    /// Wait for the primary thread to exit.
    pub fn join(self) {
        if self.join.join().is_err() {
            error!("primary context thread panicked");
        }
    }
}

/// Start the primary context on a dedicated thread.
///
/// `build` runs on that thread and receives a bridge so the context can schedule work itself.
pub fn spawn_primary<C, B>(
    worker: Handle,
    build: B,
) -> io::Result<(ExecutionBridge<C>, PrimaryThread)>
where
    C: 'static,
    B: FnOnce(ExecutionBridge<C>) -> C + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let bridge = ExecutionBridge {
        primary: tx,
        worker,
    };
    let context_bridge = bridge.clone();
    let join = thread::Builder::new()
        .name("sync-primary".into())
        .spawn(move || {
            let mut context = build(context_bridge);
            run_primary(&mut context, rx);
        })?;
    Ok((bridge, PrimaryThread { join }))
}

fn run_primary<C>(context: &mut C, mut rx: mpsc::UnboundedReceiver<PrimaryMessage<C>>) {
    debug!("primary context started");
    while let Some(message) = rx.blocking_recv() {
        match message {
            PrimaryMessage::Run(task) => {
                if panic::catch_unwind(AssertUnwindSafe(|| task(context))).is_err() {
                    error!("primary task panicked; continuing with the next task");
                }
            }
            PrimaryMessage::Shutdown => break,
        }
    }
    rx.close();
    debug!("primary context stopped");
}
