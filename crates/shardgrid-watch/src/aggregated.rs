//! Aggregated watcher — fans N watch streams into one.
//!
//! Each registered source gets its own task. The task waits on its private
//! stop signal and on the source; after reading an event it publishes to
//! the shared channel, and that publish is raced against the stop signal as
//! well. A consumer that stops reading therefore never blocks `stop()`.
//!
//! ```text
//! source 0 ──task──┐
//! source 1 ──task──┼──► aggregated channel ──► AggregatedReceiver
//! source 2 ──task──┘
//! ```
//!
//! Only source tasks publish. `stop()` signals and waits, then marks the
//! aggregate discarded; the receiver checks that mark before every read, so
//! no event is observed once `stop()` has returned. When the watcher stops
//! itself because every source ended, events already buffered are still
//! delivered before end-of-stream.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use shard_core::WatchEvent;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::error::WatchError;
use crate::interface::{BoxWatch, WatchInterface};

/// Capacity of the shared channel. Kept at one so the aggregate behaves
/// like a rendezvous: a slow consumer applies backpressure to every source.
const AGGREGATED_CAPACITY: usize = 1;

/// Per-source bookkeeping. A source registered with only an error has
/// neither a stop signal nor a task.
struct SourceSlot {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SourceSlot {
    fn is_live(&self) -> bool {
        self.handle.is_some() || self.stop_tx.is_some()
    }
}

struct State {
    next_index: usize,
    sources: BTreeMap<usize, SourceSlot>,
    errs: BTreeMap<usize, String>,
    /// Set once `stop()` has begun; no new source tasks start after this.
    stopping: bool,
}

struct Inner<T> {
    state: Mutex<State>,
    /// Serializes `stop()`.
    stop_lock: tokio::sync::Mutex<()>,
    stopped: watch::Sender<bool>,
    /// Set by an explicit stop; the receiver drops anything still buffered.
    discard: watch::Sender<bool>,
    sender: Mutex<Option<mpsc::Sender<WatchEvent<T>>>>,
    receiver: Mutex<Option<mpsc::Receiver<WatchEvent<T>>>>,
    allow_reset: bool,
}

/// Handle to an aggregated watch. Cheap to clone; all clones share state.
pub struct AggregatedWatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AggregatedWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> AggregatedWatcher<T> {
    /// An empty aggregator that stops itself once its last source ends.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// An aggregator that stays open when all sources drain.
    ///
    /// It stops on an explicit [`stop`](Self::stop) or when `parent`
    /// flips to true (or its sender goes away).
    pub fn with_reset(mut parent: watch::Receiver<bool>) -> Self {
        let watcher = Self::build(true);
        let handle = watcher.clone();
        let mut stopped = watcher.inner.stopped.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = async { let _ = parent.wait_for(|cancel| *cancel).await; } => {
                    debug!("parent cancelled, stopping aggregated watcher");
                    handle.stop().await;
                }
                _ = async { let _ = stopped.wait_for(|s| *s).await; } => {}
            }
        });
        watcher
    }

    fn build(allow_reset: bool) -> Self {
        let (tx, rx) = mpsc::channel(AGGREGATED_CAPACITY);
        let (stopped, _) = watch::channel(false);
        let (discard, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    next_index: 0,
                    sources: BTreeMap::new(),
                    errs: BTreeMap::new(),
                    stopping: false,
                }),
                stop_lock: tokio::sync::Mutex::new(()),
                stopped,
                discard,
                sender: Mutex::new(Some(tx)),
                receiver: Mutex::new(Some(rx)),
                allow_reset,
            }),
        }
    }

    /// Register a source and/or an error under the next index.
    ///
    /// A present source gets a fan-in task. A present error is recorded and
    /// reported by [`errors`](Self::errors) whether or not a source came
    /// with it. Once `stop()` has begun, an incoming source is stopped and
    /// nothing is registered.
    pub fn add_watch_interface(&self, source: Option<BoxWatch<T>>, err: Option<WatchError>) -> usize {
        let mut state = self.inner.state.lock().expect("aggregated state lock");
        let index = state.next_index;
        state.next_index += 1;

        if state.stopping {
            debug!(index, "aggregated watcher stopping, rejecting source");
            if let Some(mut source) = source {
                source.stop();
            }
            return index;
        }

        if let Some(err) = err {
            debug!(index, error = %err, "watch source registered with error");
            state.errs.insert(index, err.to_string());
        }

        let mut slot = SourceSlot {
            stop_tx: None,
            handle: None,
        };
        if let Some(mut source) = source {
            let tx = self
                .inner
                .sender
                .lock()
                .expect("aggregated sender lock")
                .clone();
            match tx {
                Some(tx) => {
                    let (stop_tx, stop_rx) = oneshot::channel();
                    let inner = Arc::clone(&self.inner);
                    slot.stop_tx = Some(stop_tx);
                    slot.handle = Some(tokio::spawn(run_source(inner, index, source, tx, stop_rx)));
                }
                None => source.stop(),
            }
        }

        state.sources.insert(index, slot);
        index
    }

    /// Take the read end of the aggregate. Only the first call gets a live
    /// receiver; later calls get one that is already at end-of-stream.
    pub fn result_chan(&self) -> AggregatedReceiver<T> {
        let rx = self
            .inner
            .receiver
            .lock()
            .expect("aggregated receiver lock")
            .take();
        AggregatedReceiver {
            rx,
            discard: self.inner.discard.subscribe(),
        }
    }

    /// Stop every source, wait for their tasks, and close the aggregate.
    /// Idempotent; concurrent callers all return after the first finishes.
    pub async fn stop(&self) {
        self.inner.shutdown(true).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.borrow()
    }

    /// Aggregate of every recorded error, or `None` if there are none.
    pub fn errors(&self) -> Option<WatchError> {
        let state = self.inner.state.lock().expect("aggregated state lock");
        if state.errs.is_empty() {
            None
        } else {
            Some(WatchError::Aggregate(state.errs.values().cloned().collect()))
        }
    }

    /// Number of registered entries, including error-only entries.
    pub fn watchers_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("aggregated state lock")
            .sources
            .len()
    }

    /// Number of sources whose task is still running.
    pub fn live_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("aggregated state lock")
            .sources
            .values()
            .filter(|s| s.is_live())
            .count()
    }

    /// Bundle this handle with its receiver as a single [`WatchInterface`].
    pub fn into_watch(self) -> AggregatedWatch<T> {
        let rx = self.result_chan();
        AggregatedWatch { watcher: self, rx }
    }
}

impl<T: Send + 'static> Default for AggregatedWatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Inner<T> {
    async fn shutdown(&self, discard: bool) {
        let _guard = self.stop_lock.lock().await;
        let already_stopped = *self.stopped.borrow();
        if !already_stopped {
            let handles = self.signal_stop();
            let count = handles.len();
            for handle in handles {
                let _ = handle.await;
            }
            self.stopped.send_replace(true);
            info!(sources = count, "aggregated watcher stopped");
        }
        if discard {
            self.discard.send_replace(true);
        }
    }

    /// Signal every live source and take their task handles. Synchronous.
    fn signal_stop(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        {
            let mut state = self.state.lock().expect("aggregated state lock");
            state.stopping = true;
            for slot in state.sources.values_mut() {
                if let Some(stop_tx) = slot.stop_tx.take() {
                    let _ = stop_tx.send(());
                }
                if let Some(handle) = slot.handle.take() {
                    handles.push(handle);
                }
            }
        }
        // Tasks hold their own clones; the channel closes when they exit.
        self.sender.lock().expect("aggregated sender lock").take();
        handles
    }

    /// Called by a source task as it exits.
    fn close_watcher(self: &Arc<Self>, index: usize) {
        let live_left = {
            let mut state = self.state.lock().expect("aggregated state lock");
            state.sources.remove(&index);
            state.errs.remove(&index);
            let live = state.sources.values().filter(|s| s.is_live()).count();
            if state.stopping { None } else { Some(live) }
        };
        debug!(index, "watch source closed");

        if live_left == Some(0) && !self.allow_reset {
            debug!("last watch source closed, stopping aggregated watcher");
            // Run detached: a concurrent stop() may be awaiting this task.
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.shutdown(false).await });
        }
    }
}

async fn run_source<T: Send + 'static>(
    inner: Arc<Inner<T>>,
    index: usize,
    mut source: BoxWatch<T>,
    tx: mpsc::Sender<WatchEvent<T>>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            event = source.recv() => {
                let Some(event) = event else { break };
                tokio::select! {
                    biased;
                    _ = &mut stop => break,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
    source.stop();
    drop(tx);
    inner.close_watcher(index);
}

/// Read end of an [`AggregatedWatcher`].
pub struct AggregatedReceiver<T> {
    rx: Option<mpsc::Receiver<WatchEvent<T>>>,
    discard: watch::Receiver<bool>,
}

impl<T: Send + 'static> AggregatedReceiver<T> {
    /// Next event from any source. `None` once the stream has drained or
    /// the watcher was stopped explicitly.
    pub async fn recv(&mut self) -> Option<WatchEvent<T>> {
        let discarded = *self.discard.borrow();
        if discarded {
            self.rx = None;
            return None;
        }
        let rx = self.rx.as_mut()?;
        tokio::select! {
            biased;
            _ = self.discard.wait_for(|d| *d) => {
                self.rx = None;
                None
            }
            event = rx.recv() => event,
        }
    }

    /// Stop reading locally; later `recv` calls return `None`.
    pub fn close(&mut self) {
        self.rx = None;
    }
}

/// An aggregated watcher and its receiver, usable wherever a single
/// [`WatchInterface`] is expected.
pub struct AggregatedWatch<T> {
    watcher: AggregatedWatcher<T>,
    rx: AggregatedReceiver<T>,
}

impl<T: Send + 'static> AggregatedWatch<T> {
    pub fn watcher(&self) -> &AggregatedWatcher<T> {
        &self.watcher
    }
}

impl<T: Send + 'static> WatchInterface<T> for AggregatedWatch<T> {
    fn recv(&mut self) -> BoxFuture<'_, Option<WatchEvent<T>>> {
        Box::pin(self.rx.recv())
    }

    fn stop(&mut self) {
        self.rx.close();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let watcher = self.watcher.clone();
                rt.spawn(async move { watcher.stop().await });
            }
            Err(_) => {
                // Outside a runtime: signal only; tasks exit on their own.
                let _ = self.watcher.inner.signal_stop();
            }
        }
    }
}
