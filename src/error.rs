use std::path::PathBuf;

use serde::{ser::Serializer, Serialize};

use crate::action::ActionId;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single action against the document.
///
/// Cloneable so it can travel inside outcomes and workflow events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("no usable selector supplied")]
    InvalidLocator,
    #[error("action requires a target element but none is set")]
    MissingTarget,
    #[error("no target url set")]
    MissingUrl,
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("no element matched {0}")]
    NotFound(String),
    #[error("unexpected script reply: {0}")]
    MalformedReply(String),
    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("document host is not ready")]
    HostNotReady,
    #[error("failed to inject capture script: {0}")]
    InjectionFailed(String),
    #[error("failed to remove capture listeners: {0}")]
    DisarmFailed(String),
    #[error("unsupported action type `{0}`")]
    UnsupportedActionType(String),
    #[error("workflow file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("index {index} is out of range for a workflow of {len} actions")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("workflow is already running")]
    AlreadyRunning,
    #[error("no action with id {0}")]
    UnknownAction(ActionId),
    #[error("a picking session is already active for webview `{0}`")]
    SessionActive(String),
    #[error("webview `{0}` not found")]
    WebviewNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Tauri(#[from] tauri::Error),
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
