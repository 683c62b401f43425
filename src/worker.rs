//! Background workers for asset loading and environment decoding.
//!
//! Heavy work stays off the UI thread. Each worker owns one thread and runs
//! its queue in order; results come back over a channel and are applied to
//! the [`Viewer`] between frames with [`deliver`].

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::backend::RenderBackend;
use crate::controller::{LoadTicket, Viewer};
use crate::environment::EnvironmentTicket;
use crate::error::{EnvironmentError, LoadError, WorkerStopped};
use crate::loader::{self, DecoderCaps, LoadedAsset};
use crate::prefilter::{PrefilterSettings, ReflectionMap};

/// Called after each result is queued (e.g. to request a repaint)
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Commands sent from UI to worker.
#[derive(Debug)]
pub enum WorkerCommand {
    LoadAsset(LoadTicket),
    DecodeEnvironment(EnvironmentTicket),
    Stop,
}

/// Results sent from worker back to UI.
pub enum WorkerResult {
    Progress {
        epoch: u64,
        loaded: u64,
        total: Option<u64>,
    },
    AssetReady {
        epoch: u64,
        result: Result<LoadedAsset, LoadError>,
    },
    EnvironmentReady {
        ticket: EnvironmentTicket,
        result: Result<ReflectionMap, EnvironmentError>,
    },
}

/// Handle to communicate with a background worker.
pub struct WorkerHandle {
    tx: Sender<WorkerCommand>,
    rx: Receiver<WorkerResult>,
    handle: Option<JoinHandle<()>>,
}

struct WorkerContext {
    caps: DecoderCaps,
    prefilter: PrefilterSettings,
    waker: Option<Waker>,
}

impl WorkerHandle {
    /// Spawn a named worker thread.
    pub fn spawn(name: &str, caps: DecoderCaps, prefilter: PrefilterSettings, waker: Option<Waker>) -> Self {
        let (cmd_tx, cmd_rx) = channel::<WorkerCommand>();
        let (res_tx, res_rx) = channel::<WorkerResult>();
        let ctx = WorkerContext { caps, prefilter, waker };

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(ctx, cmd_rx, res_tx))
            .map_err(|e| tracing::error!("failed to spawn worker {}: {}", name, e))
            .ok();

        Self {
            tx: cmd_tx,
            rx: res_rx,
            handle,
        }
    }

    pub fn load_asset(&self, ticket: LoadTicket) -> Result<(), WorkerStopped> {
        self.tx.send(WorkerCommand::LoadAsset(ticket)).map_err(|_| WorkerStopped)
    }

    pub fn decode_environment(&self, ticket: EnvironmentTicket) -> Result<(), WorkerStopped> {
        self.tx.send(WorkerCommand::DecodeEnvironment(ticket)).map_err(|_| WorkerStopped)
    }

    /// Check for ready results (non-blocking).
    pub fn try_recv(&self) -> Option<WorkerResult> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next result.
    pub fn recv(&self) -> Option<WorkerResult> {
        self.rx.recv().ok()
    }

    /// Stop the worker and wait for it to finish.
    pub fn stop(&mut self) {
        let _ = self.tx.send(WorkerCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply one worker result to the viewer
pub fn deliver<B: RenderBackend>(viewer: &mut Viewer<B>, result: WorkerResult) {
    match result {
        WorkerResult::Progress { epoch, loaded, total } => viewer.report_progress(epoch, loaded, total),
        WorkerResult::AssetReady { epoch, result } => {
            viewer.finish_load(epoch, result);
        }
        WorkerResult::EnvironmentReady { ticket, result } => viewer.finish_environment(&ticket, result),
    }
}

/// Send a load to `worker`; fails it on the spot if the thread has exited
pub fn queue_load<B: RenderBackend>(worker: &WorkerHandle, viewer: &mut Viewer<B>, ticket: LoadTicket) {
    let epoch = ticket.epoch;
    if let Err(e) = worker.load_asset(ticket) {
        tracing::error!("asset load not queued: {}", e);
        viewer.finish_load(epoch, Err(e.into()));
    }
}

/// Send a panorama decode to `worker`; fails it on the spot if the thread has exited
pub fn queue_environment<B: RenderBackend>(worker: &WorkerHandle, viewer: &mut Viewer<B>, ticket: EnvironmentTicket) {
    if let Err(e) = worker.decode_environment(ticket.clone()) {
        tracing::error!("environment decode not queued: {}", e);
        viewer.finish_environment(&ticket, Err(e.into()));
    }
}

/// Main worker loop - runs in background thread.
fn worker_loop(ctx: WorkerContext, rx: Receiver<WorkerCommand>, tx: Sender<WorkerResult>) {
    let send = |result: WorkerResult| -> bool {
        let ok = tx.send(result).is_ok();
        if let Some(waker) = &ctx.waker {
            waker();
        }
        ok
    };

    let mut deferred = VecDeque::new();
    loop {
        let cmd = match deferred.pop_front() {
            Some(cmd) => cmd,
            None => match rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break, // Channel closed
            },
        };

        match cmd {
            WorkerCommand::LoadAsset(ticket) => {
                // Only the newest queued load matters
                let Some(ticket) = drain_to_latest(&rx, ticket, &mut deferred) else {
                    break;
                };
                let epoch = ticket.epoch;
                let mut last_reported = 0u64;
                let result = loader::load(&ticket.source, &ctx.caps, &mut |loaded, total| {
                    if loaded == 0 || loaded - last_reported >= loader::CHUNK_SIZE as u64 * 4 || Some(loaded) == total {
                        last_reported = loaded;
                        send(WorkerResult::Progress { epoch, loaded, total });
                    }
                });
                if !send(WorkerResult::AssetReady { epoch, result }) {
                    break; // UI disconnected
                }
            }

            WorkerCommand::DecodeEnvironment(ticket) => {
                let _span = tracing::info_span!("decode_environment", preset = %ticket.preset).entered();
                let result = ticket.decode(&ctx.prefilter);
                if !send(WorkerResult::EnvironmentReady { ticket, result }) {
                    break;
                }
            }

            WorkerCommand::Stop => break,
        }
    }
}

/// Drain queued commands, keeping the latest asset load. A queued `Stop`
/// ends the drain with `None`; other commands are kept in order for later.
fn drain_to_latest(
    rx: &Receiver<WorkerCommand>,
    mut ticket: LoadTicket,
    deferred: &mut VecDeque<WorkerCommand>,
) -> Option<LoadTicket> {
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            WorkerCommand::LoadAsset(newer) => {
                tracing::debug!(skipped = ticket.epoch, "superseded load dropped from queue");
                ticket = newer;
            }
            WorkerCommand::Stop => return None,
            other => deferred.push_back(other),
        }
    }
    Some(ticket)
}
