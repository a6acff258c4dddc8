use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin configuration, read from `plugins.rpa` in `tauri.conf.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub timeouts: Timeouts,
    pub picker: PickerConfig,
    /// Treat a locator that matches nothing as a failed action instead of a silent outcome
    pub strict_locators: bool,
}

/// Timeouts applied while executing actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_field_names)]
pub struct Timeouts {
    /// Main-frame load timeout for navigation in milliseconds
    pub navigation_ms: u64,
    /// Script evaluation timeout in milliseconds
    pub script_ms: u64,
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn script(&self) -> Duration {
        Duration::from_millis(self.script_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            script_ms: 30_000,
        }
    }
}

/// Picking session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PickerConfig {
    /// Capacity of the inbound message queue per webview
    pub queue_capacity: usize,
    pub highlight_outline: String,
    pub highlight_background: String,
    /// Outline flashed on a node right after it is picked
    pub selected_outline: String,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            highlight_outline: "2px solid #e53935".into(),
            highlight_background: "rgba(229, 57, 53, 0.12)".into(),
            selected_outline: "3px solid #43a047".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeouts.navigation_ms, 30_000);
        assert_eq!(config.picker.queue_capacity, 64);
        assert!(!config.strict_locators);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "timeouts": { "navigationMs": 5000 }, "strictLocators": true }"#,
        )
        .expect("config should parse");

        assert_eq!(config.timeouts.navigation(), Duration::from_secs(5));
        assert_eq!(config.timeouts.script_ms, 30_000);
        assert!(config.strict_locators);
        assert_eq!(config.picker.highlight_outline, "2px solid #e53935");
    }
}
