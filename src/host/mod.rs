//! The document host: the capability that renders the page and runs scripts for us.

mod replies;
mod signal;
mod webview;

#[cfg(test)]
pub(crate) mod testing;

pub use replies::{PendingReplies, PendingReply};
pub use signal::{FrameLoadSignal, LoadListener, PageLoads};
pub use webview::WebviewHost;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Reply of a single script evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalReply {
    pub success: bool,
    pub result: Option<String>,
    pub message: Option<String>,
}

impl EvalReply {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            message: Some(message.into()),
        }
    }
}

/// Capability consumed by actions and picking sessions.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Evaluate a script in the main frame and report its completion value as text
    async fn evaluate(&self, script: &str) -> EvalReply;

    /// Start navigating the main frame to `url`
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Register a one-shot listener for the next main-frame load end.
    /// The listener unregisters itself when dropped.
    fn on_main_frame_load_end(&self) -> LoadListener;

    /// Whether the document can accept scripts right now
    fn is_ready(&self) -> bool;
}
