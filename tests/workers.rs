//! Background threads: asset worker progress and the repaint ticker

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use model_viewer::backend::HeadlessBackend;
use model_viewer::config::ViewerConfig;
use model_viewer::controller::Viewer;
use model_viewer::loader::{AssetSource, DecoderCaps, LoadOrigin, CHUNK_SIZE};
use model_viewer::render_loop::RenderLoop;
use model_viewer::worker::{self, WorkerHandle, WorkerResult};

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_progress_then_result() {
    let dir = TempDir::new().unwrap();
    let mut doc = common::box_document([-1.0; 3], [1.0; 3]);
    // Pad the file well past a few read chunks
    let padding = vec![0u8; CHUNK_SIZE * 12];
    doc["buffers"].as_array_mut().unwrap().push(serde_json::json!({
        "byteLength": padding.len(),
        "uri": common::data_uri("application/octet-stream", &padding),
    }));
    let path = common::write_gltf(dir.path(), "big.gltf", &doc);
    let size = std::fs::metadata(&path).unwrap().len();

    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = wakes.clone();
    let waker: worker::Waker = Arc::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let worker = WorkerHandle::spawn("test-progress", DecoderCaps::software(), Default::default(), Some(waker));

    let mut v = Viewer::new(HeadlessBackend::new(), ViewerConfig::default(), DecoderCaps::software());
    worker.load_asset(v.begin_load(AssetSource::Path(path), LoadOrigin::Explicit)).unwrap();

    let mut reports = Vec::new();
    loop {
        let result = worker.recv().expect("worker hung up");
        if let WorkerResult::Progress { loaded, total, .. } = &result {
            reports.push((*loaded, *total));
            assert!(v.progress().is_some());
        }
        let finished = matches!(result, WorkerResult::AssetReady { .. });
        worker::deliver(&mut v, result);
        if finished {
            break;
        }
    }

    assert_eq!(reports.first(), Some(&(0, Some(size))));
    assert_eq!(reports.last(), Some(&(size, Some(size))));
    assert!(reports.windows(2).all(|w| w[0].0 < w[1].0));
    // Throttled below one report per chunk
    assert!(reports.len() < (size as usize / CHUNK_SIZE));

    assert!(v.progress().is_none());
    assert!(v.status().starts_with("Loaded big.gltf"), "{}", v.status());
    // One wake per message; the last may land just after its message
    wait_until("final wake", || wakes.load(Ordering::Relaxed) == reports.len() + 1);
}

#[test]
fn test_worker_survives_malformed_asset() {
    let worker = WorkerHandle::spawn("test-malformed", DecoderCaps::software(), Default::default(), None);
    let mut v = Viewer::new(HeadlessBackend::new(), ViewerConfig::default(), DecoderCaps::software());

    let broken = serde_json::json!({
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 3 }]
    });
    let ticket = v.begin_load(
        AssetSource::Bytes {
            name: "broken.gltf".into(),
            bytes: serde_json::to_vec(&broken).unwrap(),
        },
        LoadOrigin::Explicit,
    );
    let broken_epoch = ticket.epoch;
    worker.load_asset(ticket).unwrap();

    loop {
        match worker.recv().expect("worker hung up") {
            WorkerResult::AssetReady { epoch, result } => {
                assert_eq!(epoch, broken_epoch);
                assert!(result.is_err());
                v.finish_load(epoch, result);
                break;
            }
            other => worker::deliver(&mut v, other),
        }
    }
    assert!(v.status().starts_with("Error: Invalid glTF"), "{}", v.status());

    // The same thread still takes work
    let good = common::box_document([-1.0; 3], [1.0; 3]);
    let ticket = v.begin_load(
        AssetSource::Bytes {
            name: "good.gltf".into(),
            bytes: serde_json::to_vec(&good).unwrap(),
        },
        LoadOrigin::Explicit,
    );
    worker.load_asset(ticket).unwrap();
    while v.is_loading() {
        let result = worker.recv().expect("worker hung up");
        worker::deliver(&mut v, result);
    }
    assert!(v.status().starts_with("Loaded good.gltf"), "{}", v.status());
    assert_eq!(v.subtree().map(|s| s.name.as_str()), Some("good.gltf"));
}

#[test]
fn test_worker_stop_is_idempotent() {
    let mut worker = WorkerHandle::spawn("test-stop", DecoderCaps::software(), Default::default(), None);
    worker.stop();
    worker.stop();
    assert!(worker.try_recv().is_none());
}

#[test]
fn test_cancellation_from_another_thread() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let mut render_loop = RenderLoop::start(Duration::from_millis(1), move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    wait_until("first ticks", || ticks.load(Ordering::Relaxed) >= 3);

    let handle = render_loop.cancellation_handle();
    thread::spawn(move || handle.cancel()).join().unwrap();
    wait_until("loop exit", || !render_loop.is_running());

    let stopped_at = ticks.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ticks.load(Ordering::Relaxed), stopped_at);
    assert_eq!(render_loop.frames() as usize, stopped_at);

    // Stopping after cancellation only joins the finished thread
    render_loop.stop();
    render_loop.stop();
    assert!(!render_loop.is_running());
}

#[test]
fn test_dropping_loop_stops_it() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let render_loop = RenderLoop::start(Duration::from_millis(1), move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let cancel = render_loop.cancellation_handle();
    wait_until("first tick", || ticks.load(Ordering::Relaxed) >= 1);

    drop(render_loop);
    assert!(cancel.is_cancelled());
    let after = ticks.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ticks.load(Ordering::Relaxed), after);
}
