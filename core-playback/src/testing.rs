//! In-memory audio backend for tests.
//!
//! Enabled for this crate's unit tests and, through the `test-support`
//! feature, for downstream crates' tests.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{AudioBackend, AudioHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

/// Failure switches applied to handles created by [`FakeBackend`].
#[derive(Debug, Clone, Default)]
pub struct FakeHandleOptions {
    pub duration: Option<f64>,
    pub fail_play: bool,
    pub fail_pause: bool,
    pub fail_stop: bool,
    pub fail_release: bool,
    /// `release()` never completes.
    pub hang_release: bool,
}

struct HandleState {
    url: String,
    options: FakeHandleOptions,
    calls: Mutex<Vec<String>>,
    position: Mutex<f64>,
    volume: Mutex<Option<f32>>,
    releases: AtomicUsize,
    released: AtomicBool,
    ended: Notify,
    play_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Scriptable native handle. Clones share state.
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<HandleState>,
}

impl FakeHandle {
    fn new(url: &str, options: FakeHandleOptions) -> Self {
        Self {
            state: Arc::new(HandleState {
                url: url.to_string(),
                options,
                calls: Mutex::new(Vec::new()),
                position: Mutex::new(0.0),
                volume: Mutex::new(None),
                releases: AtomicUsize::new(0),
                released: AtomicBool::new(false),
                ended: Notify::new(),
                play_gate: Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.state.url
    }

    /// Native calls in order, e.g. `["set_volume:1", "play", "seek:0"]`.
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| call.split(':').next() == Some(name))
            .count()
    }

    pub fn release_count(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn position(&self) -> f64 {
        *self.state.position.lock()
    }

    /// Simulate playback advancing.
    pub fn set_position(&self, seconds: f64) {
        *self.state.position.lock() = seconds;
    }

    pub fn volume(&self) -> Option<f32> {
        *self.state.volume.lock()
    }

    /// Simulate the track reaching its natural end.
    pub fn finish(&self) {
        self.state.ended.notify_one();
    }

    /// Hold the next `play()` until the returned sender fires.
    pub fn gate_play(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.state.play_gate.lock() = Some(rx);
        tx
    }

    /// Clones of this handle still alive, including the backend's own.
    pub fn live_references(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    fn record(&self, call: impl Into<String>) -> Result<()> {
        let call = call.into();
        self.state.calls.lock().push(call);
        if self.is_released() {
            return Err(BridgeError::Released);
        }
        Ok(())
    }

    fn fail_if(&self, fail: bool, what: &str) -> Result<()> {
        if fail {
            Err(BridgeError::OperationFailed(format!("{} rejected by fake", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AudioHandle for FakeHandle {
    async fn play(&self) -> Result<()> {
        self.record("play")?;
        let gate = self.state.play_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.fail_if(self.state.options.fail_play, "play")
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause")?;
        self.fail_if(self.state.options.fail_pause, "pause")
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop")?;
        self.fail_if(self.state.options.fail_stop, "stop")
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.record(format!("seek:{}", seconds))?;
        self.set_position(seconds);
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        if self.is_released() {
            return Err(BridgeError::Released);
        }
        Ok(self.position())
    }

    fn duration(&self) -> Option<f64> {
        self.state.options.duration
    }

    async fn set_volume(&self, level: f32) -> Result<()> {
        self.record(format!("set_volume:{}", level))?;
        *self.state.volume.lock() = Some(level);
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.state.calls.lock().push("release".to_string());
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        self.state.released.store(true, Ordering::SeqCst);
        if self.state.options.hang_release {
            std::future::pending::<()>().await;
        }
        self.fail_if(self.state.options.fail_release, "release")
    }

    async fn finished(&self) {
        self.state.ended.notified().await;
    }
}

/// Scriptable [`AudioBackend`].
#[derive(Default)]
pub struct FakeBackend {
    handles: Mutex<Vec<FakeHandle>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    failing_urls: Mutex<HashSet<String>>,
    options: Mutex<FakeHandleOptions>,
    loads: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: FakeHandleOptions) -> Self {
        let backend = Self::default();
        *backend.options.lock() = options;
        backend
    }

    /// Options for handles created from now on.
    pub fn set_options(&self, options: FakeHandleOptions) {
        *self.options.lock() = options;
    }

    /// Make loads of `url` fail.
    pub fn fail_url(&self, url: &str) {
        self.failing_urls.lock().insert(url.to_string());
    }

    /// Hold the next load of `url` until the returned sender fires (or is
    /// dropped).
    pub fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(url.to_string(), rx);
        tx
    }

    /// Number of `load()` calls started.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Handles handed out so far, oldest first.
    pub fn handles(&self) -> Vec<FakeHandle> {
        self.handles.lock().clone()
    }

    pub fn last_handle(&self) -> Option<FakeHandle> {
        self.handles.lock().last().cloned()
    }

    /// Yield until `count` loads have started.
    pub async fn wait_for_loads(&self, count: usize) {
        for _ in 0..1_000 {
            if self.load_count() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn load(&self, url: &str) -> Result<Box<dyn AudioHandle>> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().remove(url);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.failing_urls.lock().contains(url) {
            return Err(BridgeError::OperationFailed(format!(
                "cannot open {}",
                url
            )));
        }

        let handle = FakeHandle::new(url, self.options.lock().clone());
        self.handles.lock().push(handle.clone());
        Ok(Box::new(handle))
    }
}
