use std::sync::Arc;

use serde::de::DeserializeOwned;
use tauri::{plugin::PluginApi, AppHandle, Manager, Runtime};

use crate::config::Config;
use crate::host::{PageLoads, PendingReplies, WebviewHost};
use crate::picker::{PickerRegistry, PickingSession};
use crate::workflow::Workflow;
use crate::{Error, Result};

pub fn init<R: Runtime, C: DeserializeOwned>(
    app: &AppHandle<R>,
    _api: PluginApi<R, C>,
    config: Config,
) -> Rpa<R> {
    Rpa { app: app.clone(), config }
}

/// Access to the automation APIs.
pub struct Rpa<R: Runtime> {
    app: AppHandle<R>,
    config: Config,
}

impl<R: Runtime> Rpa<R> {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Document host for the webview window `label`
    pub fn host(&self, label: &str) -> Result<Arc<WebviewHost<R>>> {
        let window = self
            .app
            .get_webview_window(label)
            .ok_or_else(|| Error::WebviewNotFound(label.to_string()))?;
        let replies = Arc::clone(self.app.state::<Arc<PendingReplies>>().inner());
        let signal = self.app.state::<PageLoads>().signal(label);
        Ok(Arc::new(WebviewHost::new(
            window,
            replies,
            signal,
            self.config.timeouts.clone(),
        )))
    }

    /// Empty workflow driving the webview window `label`
    pub fn workflow(&self, label: &str) -> Result<Workflow> {
        Ok(Workflow::new(self.host(label)?, self.config.clone()))
    }

    /// Picking session on the webview window `label`. Only one may be alive per webview.
    pub fn picking_session(&self, label: &str) -> Result<PickingSession> {
        let host = self.host(label)?;
        let inbox = self
            .app
            .state::<PickerRegistry>()
            .claim(label, self.config.picker.queue_capacity)?;
        Ok(PickingSession::new(host, self.config.picker.clone(), inbox))
    }
}
