//! Interactive element picking: the operator points at the live page and the page reports back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::config::PickerConfig;
use crate::host::DocumentHost;
use crate::locator::PickedElement;
use crate::{Error, Result};

/// Installs the capture listeners once per document and arms them
const CAPTURE_SCRIPT: &str = include_str!("capture.js");

/// Command the page invokes to post picker messages
const EVENT_COMMAND: &str = "plugin:rpa|picker_event";

const DISARM_SCRIPT: &str = "window.__rpaPicker ? window.__rpaPicker.disarm() : 0";

/// Message posted by the capture script, or raised by the plugin on page unload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PickerMessage {
    Selected {
        token: String,
        element: PickedElement,
    },
    Escape {
        token: String,
    },
    #[serde(skip_deserializing)]
    DocumentUnloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `stop()` was called
    Stopped,
    /// Escape was pressed, in the page or through `cancel()`
    Escape,
    /// The page navigated away while capturing
    DocumentUnloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickEvent {
    Selected(PickedElement),
    Cancelled { reason: CancelReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickerState {
    #[default]
    Idle,
    Capturing,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArmOptions<'a> {
    token: &'a str,
    command: &'a str,
    highlight_outline: &'a str,
    highlight_background: &'a str,
    selected_outline: &'a str,
}

/// Routes inbound picker messages to the session of their webview
#[derive(Debug, Default)]
pub struct PickerRegistry {
    inboxes: Mutex<HashMap<String, mpsc::Sender<PickerMessage>>>,
}

impl PickerRegistry {
    /// Open the inbox of `label`. Fails while an earlier session for it is still alive.
    pub fn claim(&self, label: &str, capacity: usize) -> Result<mpsc::Receiver<PickerMessage>> {
        let mut inboxes = self.inboxes.lock().unwrap_or_else(PoisonError::into_inner);
        if inboxes.get(label).is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::SessionActive(label.to_string()));
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        inboxes.insert(label.to_string(), tx);
        Ok(rx)
    }

    /// Queue a message for the session of `label`. Returns false if it was dropped.
    pub fn dispatch(&self, label: &str, message: PickerMessage) -> bool {
        let mut inboxes = self.inboxes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = inboxes.get(label) else {
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(webview = label, "picker queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                inboxes.remove(label);
                false
            }
        }
    }
}

/// Picking session bound to one document host.
///
/// Messages from the page are consumed in arrival order by [`PickingSession::next_event`];
/// all session state is owned here and only changes through `&mut self`.
pub struct PickingSession {
    host: Arc<dyn DocumentHost>,
    config: PickerConfig,
    inbox: mpsc::Receiver<PickerMessage>,
    pending: VecDeque<PickEvent>,
    state: PickerState,
    token: Option<String>,
}

impl PickingSession {
    pub fn new(
        host: Arc<dyn DocumentHost>,
        config: PickerConfig,
        inbox: mpsc::Receiver<PickerMessage>,
    ) -> Self {
        Self {
            host,
            config,
            inbox,
            pending: VecDeque::new(),
            state: PickerState::Idle,
            token: None,
        }
    }

    pub fn state(&self) -> PickerState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == PickerState::Capturing
    }

    /// Token of the current arming; messages carrying any other token are ignored
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn arm_options(&self, token: &str) -> Result<String> {
        Ok(serde_json::to_string(&ArmOptions {
            token,
            command: EVENT_COMMAND,
            highlight_outline: &self.config.highlight_outline,
            highlight_background: &self.config.highlight_background,
            selected_outline: &self.config.selected_outline,
        })?)
    }

    /// Start capturing, or re-arm the listeners already installed
    pub async fn start(&mut self) -> Result<()> {
        if !self.host.is_ready() {
            return Err(Error::HostNotReady);
        }
        let token = Uuid::new_v4().to_string();
        let options = self.arm_options(&token)?;

        // Anything queued before this arming belongs to an earlier one.
        while self.inbox.try_recv().is_ok() {}

        if self.is_capturing() {
            let script = format!("window.__rpaPicker ? window.__rpaPicker.arm({options}) : 'missing'");
            let reply = self.host.evaluate(&script).await;
            if reply.success && reply.result.as_deref() == Some("rearmed") {
                tracing::debug!("picking session re-armed");
                self.token = Some(token);
                return Ok(());
            }
            tracing::debug!("capture listeners gone, reinstalling");
        }

        let reply = self
            .host
            .evaluate(&CAPTURE_SCRIPT.replace("__RPA_OPTIONS__", &options))
            .await;
        let failure = if !reply.success {
            Some(reply.message.unwrap_or_else(|| "unknown error".to_string()))
        } else {
            match reply.result.as_deref() {
                Some("armed" | "rearmed") => None,
                other => Some(format!("unexpected reply from capture script: {other:?}")),
            }
        };
        if let Some(message) = failure {
            tracing::warn!("failed to inject capture script: {message}");
            // The script may have run partway before failing.
            self.disarm_after_failure().await;
            self.reset();
            return Err(Error::InjectionFailed(message));
        }

        self.state = PickerState::Capturing;
        self.token = Some(token);
        tracing::info!("picking session started");
        Ok(())
    }

    /// Stop capturing and restore the page. No-op when idle.
    ///
    /// If the page refuses the disarm script the session keeps capturing and the call
    /// fails with [`Error::DisarmFailed`], so it can be retried.
    pub async fn stop(&mut self) -> Result<()> {
        self.teardown(CancelReason::Stopped).await
    }

    /// Cancel as if Escape was pressed
    pub async fn cancel(&mut self) -> Result<()> {
        self.teardown(CancelReason::Escape).await
    }

    async fn teardown(&mut self, reason: CancelReason) -> Result<()> {
        if !self.is_capturing() {
            return Ok(());
        }
        let reply = self.host.evaluate(DISARM_SCRIPT).await;
        if !reply.success {
            let message = reply.message.unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!("failed to remove capture listeners: {message}");
            return Err(Error::DisarmFailed(message));
        }
        self.finish(reason);
        Ok(())
    }

    /// Best effort: the session is reported idle either way
    async fn disarm_after_failure(&self) {
        let reply = self.host.evaluate(DISARM_SCRIPT).await;
        if !reply.success {
            tracing::debug!(
                "disarm after failed start also failed: {}",
                reply.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    fn reset(&mut self) {
        self.state = PickerState::Idle;
        self.token = None;
    }

    fn finish(&mut self, reason: CancelReason) {
        self.reset();
        tracing::info!("picking session ended: {reason:?}");
        self.pending.push_back(PickEvent::Cancelled { reason });
    }

    fn is_current(&self, token: &str) -> bool {
        self.token.as_deref() == Some(token)
    }

    /// Next selection or cancellation. Returns `None` once the session is idle and drained.
    pub async fn next_event(&mut self) -> Option<PickEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if !self.is_capturing() {
                return None;
            }

            match self.inbox.recv().await? {
                PickerMessage::Selected { token, element } if self.is_current(&token) => {
                    tracing::debug!("picked {}", element.display_name());
                    return Some(PickEvent::Selected(element));
                }
                // The page already disarmed itself.
                PickerMessage::Escape { token } if self.is_current(&token) => {
                    self.finish(CancelReason::Escape);
                }
                PickerMessage::DocumentUnloaded => self.finish(CancelReason::DocumentUnloaded),
                stale => tracing::debug!("dropping stale picker message: {stale:?}"),
            }
        }
    }
}

impl Drop for PickingSession {
    fn drop(&mut self) {
        if !self.is_capturing() {
            return;
        }
        let host = Arc::clone(&self.host);
        let teardown = async move {
            host.evaluate(DISARM_SCRIPT).await;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown);
            }
            Err(_) => {
                tauri::async_runtime::spawn(teardown);
            }
        }
    }
}
