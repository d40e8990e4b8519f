//! Spawning of asynchronous tasks on the platform executor.
//!
//! Off wasm the tasks run on the ambient tokio runtime, so the host must call
//! into the runtime (mounting widgets, loading the script) from within a
//! runtime context. On wasm the browser microtask queue is used. All spawned
//! work reports through channels, so the futures resolve to nothing.

use std::future::Future;

#[cfg(not(target_arch = "wasm32"))]
use maybe_sync::MaybeSend;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn spawn<T>(future: T)
where
    T: Future<Output = ()> + MaybeSend + 'static,
{
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn spawn<T>(future: T)
where
    T: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}
