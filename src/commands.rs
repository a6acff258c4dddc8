use std::sync::Arc;

use tauri::{command, Runtime, State, Webview};

use crate::host::{EvalReply, PendingReplies};
use crate::picker::{PickerMessage, PickerRegistry};

/// Called by the evaluation bridge when a script completes
#[command]
pub(crate) async fn host_reply(
    replies: State<'_, Arc<PendingReplies>>,
    id: String,
    success: bool,
    result: Option<String>,
    message: Option<String>,
) -> Result<(), ()> {
    let reply = EvalReply {
        success,
        result,
        message,
    };
    if !replies.complete(&id, reply) {
        tracing::debug!("discarding reply for expired evaluation {id}");
    }
    Ok(())
}

/// Called by the capture script for every selection or escape
#[command]
pub(crate) fn picker_event<R: Runtime>(
    webview: Webview<R>,
    registry: State<'_, PickerRegistry>,
    message: PickerMessage,
) {
    if !registry.dispatch(webview.label(), message) {
        tracing::debug!(webview = webview.label(), "picker message not delivered");
    }
}
