//! Script emission for document operations.
//!
//! Every emitted program resolves its target once, performs one operation and returns a
//! JSON-encoded reply of the form `{"found": bool, "value"?: string, "error"?: string}`.
//! All caller-supplied text is embedded as a JSON string literal, never spliced raw.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ActionError;
use crate::host::EvalReply;
use crate::locator::Locator;

/// Logical operation to perform against a resolved node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<'a> {
    Click,
    /// Read `.value` of form fields, text content otherwise
    ReadText,
    /// Assign a value and fire `input`/`change` notifications
    SetValue(&'a str),
    /// Submit the target's form, else the focused element's form, else the first form
    SubmitForm,
    /// Call a user-supplied function body with `(element, inputParam)`
    Invoke {
        body: &'a str,
        input: Option<&'a str>,
    },
}

/// Encode a string as a JavaScript string literal
pub fn js_literal(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// Emit the program for `operation` against the node `target` resolves to.
///
/// `SubmitForm` tolerates a missing or empty target and falls back to the focused or first
/// form. Every other operation requires a resolvable locator.
pub fn emit(target: Option<&Locator>, operation: &Operation<'_>) -> Result<String, ActionError> {
    let body = match operation {
        Operation::SubmitForm => return emit_submit(target),
        Operation::Click => r"el.scrollIntoView({ block: 'center', inline: 'center' });
                el.click();
                return JSON.stringify({ found: true });"
            .to_string(),
        Operation::ReadText => r"var tag = el.tagName;
                var text = (tag === 'INPUT' || tag === 'TEXTAREA' || tag === 'SELECT')
                    ? el.value
                    : el.textContent;
                return JSON.stringify({ found: true, value: text == null ? null : String(text) });"
            .to_string(),
        Operation::SetValue(text) => {
            let text = js_literal(text);
            format!(
                r"var text = {text};
                el.focus();
                if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {{
                    var proto = el.tagName === 'INPUT'
                        ? window.HTMLInputElement.prototype
                        : window.HTMLTextAreaElement.prototype;
                    var setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                    setter.call(el, text);
                }} else if (el.isContentEditable) {{
                    el.textContent = text;
                }} else {{
                    el.value = text;
                }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return JSON.stringify({{ found: true }});"
            )
        }
        Operation::Invoke { body, input } => {
            let body = js_literal(body);
            let input = input.map_or_else(|| "null".to_string(), js_literal);
            format!(
                r"try {{
                    var fn = new Function('element', 'inputParam', {body});
                    var ret = fn(el, {input});
                    var value = ret === undefined || ret === null
                        ? null
                        : (typeof ret === 'string' ? ret : JSON.stringify(ret));
                    return JSON.stringify({{ found: true, value: value }});
                }} catch (e) {{
                    return JSON.stringify({{ found: true, error: String((e && e.message) || e) }});
                }}"
            )
        }
    };

    let selector = target
        .ok_or(ActionError::InvalidLocator)?
        .to_selector_js()?;

    Ok(format!(
        r"(function() {{
            var el = {selector};
            if (!el) {{
                return JSON.stringify({{ found: false }});
            }}
            {body}
        }})()"
    ))
}

/// Submit the target's form when one is given, else the focused field's form, else the first form
fn emit_submit(target: Option<&Locator>) -> Result<String, ActionError> {
    let form = match target {
        Some(locator) if !locator.is_empty() => {
            let selector = locator.to_selector_js()?;
            format!(
                r"var target = {selector};
            var form = target && (target.tagName === 'FORM'
                ? target
                : (target.form || target.closest('form')));"
            )
        }
        _ => r"var active = document.activeElement;
            var form = (active && active.form) || document.querySelector('form');"
            .to_string(),
    };
    Ok(format!(
        r"(function() {{
            {form}
            if (!form) {{
                return JSON.stringify({{ found: false }});
            }}
            form.submit();
            return JSON.stringify({{ found: true }});
        }})()"
    ))
}

/// Decoded reply of an emitted program
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptReply {
    pub found: bool,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decode the host's reply to an emitted program
pub fn parse_reply(reply: &EvalReply) -> Result<ScriptReply, ActionError> {
    if !reply.success {
        return Err(ActionError::Script(
            reply
                .message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    let raw = reply
        .result
        .as_deref()
        .ok_or_else(|| ActionError::MalformedReply("empty result".to_string()))?;
    serde_json::from_str(raw).map_err(|e| ActionError::MalformedReply(format!("{e}: {raw}")))
}
