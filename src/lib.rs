use std::sync::Arc;

use tauri::{
    plugin::{Builder, TauriPlugin},
    webview::PageLoadEvent,
    Manager, Runtime,
};

mod commands;
mod desktop;
mod error;

pub mod action;
pub mod config;
pub mod host;
pub mod locator;
pub mod picker;
pub mod script;
pub mod workflow;

pub use action::{Action, ActionId, ActionKind, Outcome};
pub use config::Config;
pub use desktop::Rpa;
pub use error::{ActionError, Error, Result};
pub use locator::{Locator, LocatorStrategy, PickedElement};
pub use picker::{CancelReason, PickEvent, PickingSession};
pub use workflow::{RunState, Workflow, WorkflowEvent};

use host::{PageLoads, PendingReplies};
use picker::{PickerMessage, PickerRegistry};

/// Extensions to [`tauri::App`], [`tauri::AppHandle`] and [`tauri::Window`] to access the RPA APIs.
pub trait RpaExt<R: Runtime> {
    fn rpa(&self) -> &Rpa<R>;
}

impl<R: Runtime, T: Manager<R>> RpaExt<R> for T {
    fn rpa(&self) -> &Rpa<R> {
        self.state::<Rpa<R>>().inner()
    }
}

/// Initializes the plugin.
#[must_use]
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<Config>> {
    Builder::<R, Option<Config>>::new("rpa")
        .invoke_handler(tauri::generate_handler![
            commands::host_reply,
            commands::picker_event
        ])
        .setup(|app, api| {
            let config = api.config().clone().unwrap_or_default();
            app.manage(Arc::new(PendingReplies::default()));
            app.manage(PageLoads::default());
            app.manage(PickerRegistry::default());
            app.manage(desktop::init(app, api, config));

            tracing::info!("RPA plugin initialized");
            Ok(())
        })
        .on_page_load(|webview, payload| {
            let label = webview.label();
            let Some(loads) = webview.try_state::<PageLoads>() else {
                return;
            };
            let signal = loads.signal(label);
            match payload.event() {
                PageLoadEvent::Started => {
                    signal.load_started();
                    if let Some(registry) = webview.try_state::<PickerRegistry>() {
                        registry.dispatch(label, PickerMessage::DocumentUnloaded);
                    }
                    tracing::debug!(webview = label, "loading {}", payload.url());
                }
                PageLoadEvent::Finished => {
                    let notified = signal.load_finished();
                    tracing::debug!(webview = label, "page loaded, {notified} listeners notified");
                }
            }
        })
        .build()
}
