use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ActionError;
use crate::host::DocumentHost;
use crate::locator::Locator;
use crate::script::{self, Operation, ScriptReply};

/// Pause used by a `Wait` action that does not say how long
pub const DEFAULT_WAIT_MS: u64 = 1_000;

/// Identity of an action within a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of executing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The action ran; carries the extracted text for reading actions
    Success(Option<String>),
    /// The locator matched no node. Not an error unless locators are strict.
    NotFound,
    Failed(ActionError),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Success(text) => text.as_deref(),
            _ => None,
        }
    }
}

/// The instruction set. `extracted_text` and `result` are run outputs, overwritten on every
/// execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Click {
        target: Option<Locator>,
    },
    InputText {
        target: Option<Locator>,
        text: String,
    },
    GetText {
        target: Option<Locator>,
        extracted_text: Option<String>,
    },
    Navigate {
        url: String,
    },
    Wait {
        duration_ms: u64,
    },
    SubmitForm {
        form: Option<Locator>,
    },
    ExecuteScript {
        target: Option<Locator>,
        script: String,
        input: Option<String>,
        result: Option<String>,
    },
}

impl ActionKind {
    /// Discriminator used in workflow files
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "click",
            ActionKind::InputText { .. } => "inputText",
            ActionKind::GetText { .. } => "getText",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Wait { .. } => "wait",
            ActionKind::SubmitForm { .. } => "submitForm",
            ActionKind::ExecuteScript { .. } => "executeScript",
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "Click element",
            ActionKind::InputText { .. } => "Input text",
            ActionKind::GetText { .. } => "Get text",
            ActionKind::Navigate { .. } => "Navigate to URL",
            ActionKind::Wait { .. } => "Wait",
            ActionKind::SubmitForm { .. } => "Submit form",
            ActionKind::ExecuteScript { .. } => "Execute script",
        }
    }

    pub fn target(&self) -> Option<&Locator> {
        match self {
            ActionKind::Click { target }
            | ActionKind::InputText { target, .. }
            | ActionKind::GetText { target, .. }
            | ActionKind::ExecuteScript { target, .. } => target.as_ref(),
            ActionKind::SubmitForm { form } => form.as_ref(),
            ActionKind::Navigate { .. } | ActionKind::Wait { .. } => None,
        }
    }

    /// Assign a target. Returns false for kinds that take no locator.
    pub fn set_target(&mut self, locator: Locator) -> bool {
        match self {
            ActionKind::Click { target }
            | ActionKind::InputText { target, .. }
            | ActionKind::GetText { target, .. }
            | ActionKind::ExecuteScript { target, .. } => {
                *target = Some(locator);
                true
            }
            ActionKind::SubmitForm { form } => {
                *form = Some(locator);
                true
            }
            ActionKind::Navigate { .. } | ActionKind::Wait { .. } => false,
        }
    }
}

/// One instruction against the document, with its identity and labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    id: ActionId,
    pub name: String,
    pub description: Option<String>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: ActionId::new(),
            name: kind.default_name().to_string(),
            description: None,
            kind,
        }
    }

    /// Rebuild an action with a known identity, as read back from a workflow file
    pub fn with_id(
        id: ActionId,
        name: impl Into<String>,
        description: Option<String>,
        kind: ActionKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description,
            kind,
        }
    }

    pub fn click(target: Locator) -> Self {
        Self::new(ActionKind::Click {
            target: Some(target),
        })
    }

    pub fn input_text(target: Locator, text: impl Into<String>) -> Self {
        Self::new(ActionKind::InputText {
            target: Some(target),
            text: text.into(),
        })
    }

    pub fn get_text(target: Locator) -> Self {
        Self::new(ActionKind::GetText {
            target: Some(target),
            extracted_text: None,
        })
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(ActionKind::Navigate { url: url.into() })
    }

    pub fn wait(duration_ms: u64) -> Self {
        Self::new(ActionKind::Wait { duration_ms })
    }

    pub fn submit_form(form: Option<Locator>) -> Self {
        Self::new(ActionKind::SubmitForm { form })
    }

    pub fn execute_script(
        target: Locator,
        script: impl Into<String>,
        input: Option<String>,
    ) -> Self {
        Self::new(ActionKind::ExecuteScript {
            target: Some(target),
            script: script.into(),
            input,
            result: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub(crate) fn renew_id(&mut self) {
        self.id = ActionId::new();
    }

    /// Text produced by the last run of a reading action
    pub fn extracted_text(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::GetText { extracted_text, .. } => extracted_text.as_deref(),
            ActionKind::ExecuteScript { result, .. } => result.as_deref(),
            _ => None,
        }
    }

    /// Run the action against `host`.
    pub async fn execute(&mut self, host: &dyn DocumentHost, config: &Config) -> Outcome {
        tracing::debug!(action = %self.id, kind = self.kind.type_name(), "executing {}", self.name);

        let outcome = match self.run(host, config).await {
            Ok(Outcome::NotFound) if config.strict_locators => {
                let target = self
                    .kind
                    .target()
                    .map_or_else(|| "form".to_string(), ToString::to_string);
                Outcome::Failed(ActionError::NotFound(target))
            }
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(e),
        };

        match &outcome {
            Outcome::Failed(e) => tracing::warn!(action = %self.id, "{} failed: {e}", self.name),
            Outcome::NotFound => tracing::debug!(action = %self.id, "{} matched no element", self.name),
            Outcome::Success(_) => {}
        }
        outcome
    }

    async fn run(&mut self, host: &dyn DocumentHost, config: &Config) -> Result<Outcome, ActionError> {
        match &mut self.kind {
            ActionKind::Click { target } => {
                let target = required(target.as_ref())?;
                let reply = evaluate(host, Some(target), &Operation::Click).await?;
                Ok(found_or_missing(reply.found))
            }
            ActionKind::InputText { target, text } => {
                let target = required(target.as_ref())?;
                let reply = evaluate(host, Some(target), &Operation::SetValue(text.as_str())).await?;
                Ok(found_or_missing(reply.found))
            }
            ActionKind::GetText {
                target,
                extracted_text,
            } => {
                *extracted_text = None;
                let target = required(target.as_ref())?;
                let reply = evaluate(host, Some(target), &Operation::ReadText).await?;
                if !reply.found {
                    return Ok(Outcome::NotFound);
                }
                extracted_text.clone_from(&reply.value);
                Ok(Outcome::Success(reply.value))
            }
            ActionKind::Navigate { url } => navigate(host, url, config).await,
            ActionKind::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(Outcome::Success(None))
            }
            ActionKind::SubmitForm { form } => {
                let reply = evaluate(host, form.as_ref(), &Operation::SubmitForm).await?;
                Ok(found_or_missing(reply.found))
            }
            ActionKind::ExecuteScript {
                target,
                script,
                input,
                result,
            } => {
                *result = None;
                let target = required(target.as_ref())?;
                let operation = Operation::Invoke {
                    body: script.as_str(),
                    input: input.as_deref(),
                };
                let reply = evaluate(host, Some(target), &operation).await?;
                if !reply.found {
                    return Ok(Outcome::NotFound);
                }
                if let Some(error) = reply.error {
                    *result = Some(format!("Error: {error}"));
                    return Err(ActionError::Script(error));
                }
                result.clone_from(&reply.value);
                Ok(Outcome::Success(reply.value))
            }
        }
    }
}

fn required(target: Option<&Locator>) -> Result<&Locator, ActionError> {
    match target {
        Some(locator) if !locator.is_empty() => Ok(locator),
        _ => Err(ActionError::MissingTarget),
    }
}

fn found_or_missing(found: bool) -> Outcome {
    if found {
        Outcome::Success(None)
    } else {
        Outcome::NotFound
    }
}

async fn evaluate(
    host: &dyn DocumentHost,
    target: Option<&Locator>,
    operation: &Operation<'_>,
) -> Result<ScriptReply, ActionError> {
    let program = script::emit(target, operation)?;
    let reply = host.evaluate(&program).await;
    script::parse_reply(&reply)
}

async fn navigate(
    host: &dyn DocumentHost,
    url: &str,
    config: &Config,
) -> Result<Outcome, ActionError> {
    let url = normalize_url(url)?;

    // Register before navigating so a fast load cannot slip past us.
    let mut listener = host.on_main_frame_load_end();
    host.navigate(&url)
        .await
        .map_err(|e| ActionError::Script(e.to_string()))?;

    match tokio::time::timeout(config.timeouts.navigation(), listener.wait()).await {
        Ok(true) => Ok(Outcome::Success(None)),
        Ok(false) => Err(ActionError::Script(
            "load notification channel closed".to_string(),
        )),
        Err(_) => Err(ActionError::NavigationTimeout {
            url,
            timeout_ms: config.timeouts.navigation_ms,
        }),
    }
}

/// Prefix `https://` to bare hosts and paths; leave URLs with a scheme alone
pub fn normalize_url(url: &str) -> Result<String, ActionError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ActionError::MissingUrl);
    }
    if url.chars().any(char::is_whitespace) {
        return Err(ActionError::InvalidUrl(url.to_string()));
    }
    if has_scheme(url) {
        Ok(url.to_string())
    } else {
        Ok(format!("https://{url}"))
    }
}

fn has_scheme(url: &str) -> bool {
    const OPAQUE: [&str; 3] = ["about:", "data:", "blob:"];
    if OPAQUE.iter().any(|prefix| url.starts_with(prefix)) {
        return true;
    }
    match url.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
