//! Main-frame load notifications with self-unregistering listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct SignalState {
    loading: bool,
    next_id: u64,
    listeners: HashMap<u64, oneshot::Sender<()>>,
}

/// Load state of one webview plus the listeners waiting for its next load end
#[derive(Debug, Default)]
pub struct FrameLoadSignal {
    state: Mutex<SignalState>,
}

impl FrameLoadSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a one-shot listener for the next load end
    pub fn subscribe(self: &Arc<Self>) -> LoadListener {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(id, tx);
        LoadListener {
            id,
            signal: Arc::clone(self),
            rx,
        }
    }

    pub fn load_started(&self) {
        self.lock().loading = true;
    }

    /// Mark the page loaded and wake every registered listener.
    /// Returns how many listeners were notified.
    pub fn load_finished(&self) -> usize {
        let listeners = {
            let mut state = self.lock();
            state.loading = false;
            std::mem::take(&mut state.listeners)
        };
        let count = listeners.len();
        for (_, tx) in listeners {
            let _ = tx.send(());
        }
        count
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn unregister(&self, id: u64) {
        self.lock().listeners.remove(&id);
    }
}

/// Pending one-shot registration on a [`FrameLoadSignal`].
///
/// Dropping it removes the registration, whichever way the wait ended.
#[derive(Debug)]
pub struct LoadListener {
    id: u64,
    signal: Arc<FrameLoadSignal>,
    rx: oneshot::Receiver<()>,
}

impl LoadListener {
    /// Wait for the load end. Returns false if the signal went away first.
    pub async fn wait(&mut self) -> bool {
        (&mut self.rx).await.is_ok()
    }
}

impl Drop for LoadListener {
    fn drop(&mut self) {
        self.signal.unregister(self.id);
    }
}

/// Load signals of every webview, keyed by label
#[derive(Debug, Default)]
pub struct PageLoads {
    signals: Mutex<HashMap<String, Arc<FrameLoadSignal>>>,
}

impl PageLoads {
    /// Get or create the signal for a webview
    pub fn signal(&self, label: &str) -> Arc<FrameLoadSignal> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            signals
                .entry(label.to_string())
                .or_insert_with(FrameLoadSignal::new),
        )
    }
}
