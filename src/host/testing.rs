//! Scripted in-memory document host for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DocumentHost, EvalReply, FrameLoadSignal, LoadListener};
use crate::Result;

type Responder = Box<dyn Fn(&str) -> EvalReply + Send + Sync>;

/// Records every script and navigation; replies through a caller-supplied responder.
pub(crate) struct ScriptedHost {
    responder: Responder,
    scripts: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    pub(crate) signal: Arc<FrameLoadSignal>,
    ready: Mutex<bool>,
    finish_load_on_navigate: bool,
}

impl ScriptedHost {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> EvalReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            scripts: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            signal: FrameLoadSignal::new(),
            ready: Mutex::new(true),
            finish_load_on_navigate: true,
        }
    }

    /// Host whose scripts all report an element found
    pub(crate) fn found() -> Self {
        Self::new(|_| EvalReply::ok(r#"{"found":true}"#))
    }

    /// Navigations never finish loading
    pub(crate) fn stalled(mut self) -> Self {
        self.finish_load_on_navigate = false;
        self
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }

    pub(crate) fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentHost for ScriptedHost {
    async fn evaluate(&self, script: &str) -> EvalReply {
        self.scripts.lock().unwrap().push(script.to_string());
        (self.responder)(script)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.finish_load_on_navigate {
            self.signal.load_finished();
        }
        Ok(())
    }

    fn on_main_frame_load_end(&self) -> LoadListener {
        self.signal.subscribe()
    }

    fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }
}
