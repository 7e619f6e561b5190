//! Helpers for working with asynchronous tasks.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument as _;

/// Spawns a new named asynchronous task, returning a [`JoinHandle`] for it.
///
/// This function is a thin wrapper over [`tokio::spawn`], and provides implicit "tracing" for spawned futures by
/// running them inside a child of the current `tracing` span that carries the task name.
pub fn spawn_traced_named<S, F, T>(name: S, f: F) -> JoinHandle<T>
where
    S: Into<String>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let span = tracing::debug_span!("task", task_name = %name);
    tokio::task::spawn(f.instrument(span))
}
