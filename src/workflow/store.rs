//! Workflow files: a pretty-printed JSON array of action records.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionId, ActionKind, DEFAULT_WAIT_MS};
use crate::locator::Locator;
use crate::{Error, Result};

/// On-disk shape of one action. Also accepts the PascalCase records of the legacy tool.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Id")]
    id: Option<ActionId>,
    #[serde(rename = "type", alias = "Type")]
    kind: String,
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Description")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "TargetElement")]
    target: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Text")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Url")]
    url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "WaitTimeMilliseconds"
    )]
    duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "FormElement")]
    form: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ScriptTemplate")]
    script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "InputParameter")]
    input: Option<String>,
}

impl Record {
    fn empty(action: &Action) -> Self {
        Self {
            id: Some(action.id()),
            kind: action.kind.type_name().to_string(),
            name: Some(action.name.clone()),
            description: action.description.clone(),
            target: None,
            text: None,
            url: None,
            duration_ms: None,
            form: None,
            script: None,
            input: None,
        }
    }

    fn into_action(self) -> Result<Action> {
        let target = self.target.filter(|l| !l.is_empty());
        let kind = match self.kind.as_str() {
            "click" | "ClickElementAction" => ActionKind::Click { target },
            "inputText" | "InputTextAction" => ActionKind::InputText {
                target,
                text: self.text.unwrap_or_default(),
            },
            "getText" | "GetTextAction" => ActionKind::GetText {
                target,
                extracted_text: None,
            },
            "navigate" | "NavigateAction" => ActionKind::Navigate {
                url: self.url.unwrap_or_default(),
            },
            "wait" | "WaitAction" => ActionKind::Wait {
                duration_ms: self.duration_ms.unwrap_or(DEFAULT_WAIT_MS),
            },
            "submitForm" | "SubmitFormAction" => ActionKind::SubmitForm {
                form: self.form.filter(|l| !l.is_empty()),
            },
            "executeScript" | "ExecuteJavaScriptAction" => ActionKind::ExecuteScript {
                target,
                script: self.script.unwrap_or_default(),
                input: self.input,
                result: None,
            },
            other => return Err(Error::UnsupportedActionType(other.to_string())),
        };

        let name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| kind.default_name().to_string());
        Ok(Action::with_id(
            self.id.unwrap_or_default(),
            name,
            self.description,
            kind,
        ))
    }
}

impl From<&Action> for Record {
    fn from(action: &Action) -> Self {
        let mut record = Record::empty(action);
        match &action.kind {
            ActionKind::Click { target } | ActionKind::GetText { target, .. } => {
                record.target = target.clone();
            }
            ActionKind::InputText { target, text } => {
                record.target = target.clone();
                record.text = Some(text.clone());
            }
            ActionKind::Navigate { url } => record.url = Some(url.clone()),
            ActionKind::Wait { duration_ms } => record.duration_ms = Some(*duration_ms),
            ActionKind::SubmitForm { form } => record.form = form.clone(),
            ActionKind::ExecuteScript {
                target,
                script,
                input,
                ..
            } => {
                record.target = target.clone();
                record.script = Some(script.clone());
                record.input = input.clone();
            }
        }
        record
    }
}

/// Write `actions` to `path`, replacing it atomically
pub fn save(path: &Path, actions: &[Action]) -> Result<()> {
    let records: Vec<Record> = actions.iter().map(Record::from).collect();
    let json = serde_json::to_string_pretty(&records)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;

    tracing::debug!("saved {} actions to {}", actions.len(), path.display());
    Ok(())
}

/// Read the action list stored at `path`
pub fn load(path: &Path) -> Result<Vec<Action>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let json = std::fs::read_to_string(path)?;
    let records: Vec<Record> = serde_json::from_str(&json)?;
    let actions = records
        .into_iter()
        .map(Record::into_action)
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("loaded {} actions from {}", actions.len(), path.display());
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Action> {
        vec![
            Action::navigate("example.com/login").with_description("open the login page"),
            Action::input_text(Locator::by_id("user"), "alice"),
            Action::click(Locator::by_css("button[type=submit]")).with_name("Sign in"),
            Action::wait(250),
            Action::get_text(Locator::by_xpath("//h1[1]")),
            Action::submit_form(None),
            Action::execute_script(
                Locator::by_id("grid"),
                "return element.rows.length + inputParam;",
                Some("0".into()),
            ),
        ]
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        let actions = sample();

        save(&path, &actions).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, actions);
    }

    #[test]
    fn test_run_outputs_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        let mut action = Action::get_text(Locator::by_id("total"));
        action.kind = ActionKind::GetText {
            target: Some(Locator::by_id("total")),
            extracted_text: Some("42".into()),
        };

        save(&path, std::slice::from_ref(&action)).unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(!json.contains("42"));

        let loaded = load(&path).unwrap();
        assert_eq!(loaded[0].extracted_text(), None);
        assert_eq!(loaded[0].id(), action.id());
    }

    #[test]
    fn test_record_shape() {
        let action = Action::wait(500);
        let value = serde_json::to_value(Record::from(&action)).unwrap();

        assert_eq!(value["type"], "wait");
        assert_eq!(value["name"], "Wait");
        assert_eq!(value["durationMs"], 500);
        assert!(value.get("target").is_none());
    }

    #[test]
    fn test_load_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r##"[
              {
                "Type": "ClickElementAction",
                "Name": "Press go",
                "Description": null,
                "TargetElement": {
                  "TagName": "BUTTON",
                  "Id": "go",
                  "XPath": "//*[@id=\"go\"]",
                  "CssSelector": "#go"
                }
              },
              { "Type": "WaitAction", "Name": "Pause", "WaitTimeMilliseconds": 2000 },
              { "Type": "NavigateAction", "Name": "Home", "Url": "example.com" },
              { "Type": "SubmitFormAction", "Name": "Send", "FormElement": null }
            ]"##,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].name, "Press go");
        assert_eq!(loaded[0].kind.target().map(|l| l.id()), Some("go"));
        assert_eq!(loaded[1].kind, ActionKind::Wait { duration_ms: 2000 });
        assert_eq!(
            loaded[2].kind,
            ActionKind::Navigate {
                url: "example.com".into()
            }
        );
        assert_eq!(loaded[3].kind, ActionKind::SubmitForm { form: None });
        assert_ne!(loaded[0].id(), loaded[1].id());
    }

    #[test]
    fn test_load_legacy_script_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r##"[
              {
                "Type": "ExecuteJavaScriptAction",
                "Name": "Count rows",
                "Description": "rows in the grid",
                "TargetElement": { "TagName": "TABLE", "Id": "grid", "CssSelector": "#grid" },
                "ScriptTemplate": "return element.rows.length + inputParam;",
                "InputParameter": "0"
              },
              { "Type": "ExecuteJavaScriptAction", "Name": "Bare", "Description": null }
            ]"##,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(
            loaded[0].kind,
            ActionKind::ExecuteScript {
                target: Some(Locator::from_parts("grid", "#grid", "")),
                script: "return element.rows.length + inputParam;".into(),
                input: Some("0".into()),
                result: None,
            }
        );
        assert_eq!(loaded[0].description.as_deref(), Some("rows in the grid"));
        assert_eq!(
            loaded[1].kind,
            ActionKind::ExecuteScript {
                target: None,
                script: String::new(),
                input: None,
                result: None,
            }
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let record: Record = serde_json::from_str(r#"{"type":"wait"}"#).unwrap();
        let action = record.into_action().unwrap();

        assert_eq!(action.name, "Wait");
        assert_eq!(
            action.kind,
            ActionKind::Wait {
                duration_ms: DEFAULT_WAIT_MS
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"[{"type":"hover","name":"Hover"}]"#).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedActionType(t) if t == "hover"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(p) if p == path));
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, "not json").unwrap();

        save(&path, &[Action::wait(10)]).unwrap();
        assert_eq!(load(&path).unwrap().len(), 1);
    }
}
