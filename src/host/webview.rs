use std::sync::Arc;

use async_trait::async_trait;
use tauri::{Runtime, WebviewWindow};

use super::{DocumentHost, EvalReply, FrameLoadSignal, LoadListener, PendingReplies};
use crate::config::Timeouts;
use crate::script::js_literal;
use crate::Result;

/// Command the page invokes to report an evaluation result
const REPLY_COMMAND: &str = "plugin:rpa|host_reply";

/// Document host backed by a Tauri webview window.
///
/// Scripts are evaluated fire-and-forget through `eval`; a small bridge around each
/// script posts its completion value back through the `host_reply` command, which
/// completes the matching entry in [`PendingReplies`].
pub struct WebviewHost<R: Runtime> {
    window: WebviewWindow<R>,
    replies: Arc<PendingReplies>,
    signal: Arc<FrameLoadSignal>,
    timeouts: Timeouts,
}

impl<R: Runtime> WebviewHost<R> {
    pub fn new(
        window: WebviewWindow<R>,
        replies: Arc<PendingReplies>,
        signal: Arc<FrameLoadSignal>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            window,
            replies,
            signal,
            timeouts,
        }
    }

    pub fn label(&self) -> &str {
        self.window.label()
    }
}

/// Wrap `script` so its completion value (awaited if it is a promise) is posted back under `id`
fn bridge_script(id: &str, script: &str) -> String {
    let id = js_literal(id);
    let command = js_literal(REPLY_COMMAND);
    let script = js_literal(script);
    format!(
        r"(function() {{
            var id = {id};
            function reply(payload) {{
                payload.id = id;
                window.__TAURI_INTERNALS__.invoke({command}, payload);
            }}
            function fail(e) {{
                reply({{ success: false, result: null, message: String((e && e.message) || e) }});
            }}
            try {{
                Promise.resolve((0, eval)({script})).then(function(value) {{
                    var result = value === undefined || value === null
                        ? null
                        : (typeof value === 'string' ? value : JSON.stringify(value));
                    reply({{ success: true, result: result, message: null }});
                }}, fail);
            }} catch (e) {{
                fail(e);
            }}
        }})();"
    )
}

#[async_trait]
impl<R: Runtime> DocumentHost for WebviewHost<R> {
    async fn evaluate(&self, script: &str) -> EvalReply {
        // Released on every exit, including when the caller drops this future.
        let mut pending = self.replies.register();

        if let Err(e) = self.window.eval(bridge_script(pending.id(), script).as_str()) {
            tracing::warn!(webview = %self.label(), "script evaluation failed: {e}");
            return EvalReply::failed(e.to_string());
        }

        match tokio::time::timeout(self.timeouts.script(), pending.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => EvalReply::failed("reply channel closed"),
            Err(_) => {
                tracing::warn!(
                    webview = %self.label(),
                    "script evaluation timed out after {} ms",
                    self.timeouts.script_ms
                );
                EvalReply::failed(format!(
                    "script evaluation timed out after {} ms",
                    self.timeouts.script_ms
                ))
            }
        }
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let script = format!("window.location.href = {}; null;", js_literal(url));
        self.window.eval(script.as_str())?;
        tracing::debug!(webview = %self.label(), "navigating to {url}");
        Ok(())
    }

    fn on_main_frame_load_end(&self) -> LoadListener {
        self.signal.subscribe()
    }

    fn is_ready(&self) -> bool {
        !self.signal.is_loading()
    }
}
