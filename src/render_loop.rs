//! Start/stop-able frame ticker.
//!
//! Calls a closure once per interval on a background thread until the loop
//! is stopped or its [`CancellationHandle`] is cancelled. The window uses it
//! to request repaints so camera damping keeps animating without input.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cloneable stop flag shared with the ticker thread
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct RenderLoop {
    cancel: CancellationHandle,
    frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Spawn the ticker; `tick` runs every `interval` until cancelled
    pub fn start<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = CancellationHandle::default();
        let frames = Arc::new(AtomicU64::new(0));

        let flag = cancel.clone();
        let counter = frames.clone();
        let handle = thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || {
                while !flag.is_cancelled() {
                    tick();
                    counter.fetch_add(1, Ordering::Relaxed);
                    thread::park_timeout(interval);
                }
                tracing::debug!("render loop exited");
            })
            .map_err(|e| tracing::error!("failed to spawn render loop: {}", e))
            .ok();

        Self {
            cancel,
            frames,
            handle,
        }
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    /// Ticks delivered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the thread to exit
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
