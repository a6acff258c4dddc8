use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ActionError;
use crate::script::js_literal;

/// Locator strategies, listed in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    Id,
    CssSelector,
    XPath,
}

impl LocatorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::CssSelector => "css selector",
            LocatorStrategy::XPath => "xpath",
        }
    }

    /// JavaScript expression evaluating to the first matching node, or null
    pub fn to_selector_js(&self, value: &str) -> String {
        let literal = js_literal(value);
        match self {
            LocatorStrategy::Id => format!("document.getElementById({literal})"),
            LocatorStrategy::CssSelector => format!("document.querySelector({literal})"),
            LocatorStrategy::XPath => format!(
                "document.evaluate({literal}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
            ),
        }
    }
}

/// Describes how to find one node in the document.
///
/// Normally exactly one of the three fields is set. Records that carry more than one
/// resolve by id, then CSS selector, then XPath; the first non-empty field wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    #[serde(
        default,
        alias = "Id",
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    id: String,
    #[serde(
        default,
        alias = "CssSelector",
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    css_selector: String,
    #[serde(
        default,
        rename = "xPath",
        alias = "XPath",
        alias = "xpath",
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    xpath: String,
}

impl Locator {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn by_css(selector: impl Into<String>) -> Self {
        Self {
            css_selector: selector.into(),
            ..Self::default()
        }
    }

    pub fn by_xpath(path: impl Into<String>) -> Self {
        Self {
            xpath: path.into(),
            ..Self::default()
        }
    }

    /// Build a locator from all three fields at once, as stored by older workflow files
    pub fn from_parts(
        id: impl Into<String>,
        css_selector: impl Into<String>,
        xpath: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            css_selector: css_selector.into(),
            xpath: xpath.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn css_selector(&self) -> &str {
        &self.css_selector
    }

    pub fn xpath(&self) -> &str {
        &self.xpath
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.css_selector.is_empty() && self.xpath.is_empty()
    }

    /// Pick the strategy to resolve with. Evaluated on every call, never cached.
    pub fn resolve(&self) -> Result<(LocatorStrategy, &str), ActionError> {
        if !self.id.is_empty() {
            Ok((LocatorStrategy::Id, &self.id))
        } else if !self.css_selector.is_empty() {
            Ok((LocatorStrategy::CssSelector, &self.css_selector))
        } else if !self.xpath.is_empty() {
            Ok((LocatorStrategy::XPath, &self.xpath))
        } else {
            Err(ActionError::InvalidLocator)
        }
    }

    /// JavaScript expression evaluating to the resolved node, or null
    pub fn to_selector_js(&self) -> Result<String, ActionError> {
        let (strategy, value) = self.resolve()?;
        Ok(strategy.to_selector_js(value))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Ok((LocatorStrategy::Id, id)) => write!(f, "#{id}"),
            Ok((_, value)) => f.write_str(value),
            Err(_) => f.write_str("<empty locator>"),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Metadata of a node the operator clicked during a picking session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PickedElement {
    pub tag_name: String,
    pub id: String,
    pub name: Option<String>,
    pub class_name: Option<String>,
    #[serde(rename = "type")]
    pub element_type: Option<String>,
    pub value: Option<String>,
    /// Markup inside the node, as the page reported it
    #[serde(rename = "innerHTML")]
    pub inner_html: Option<String>,
    pub xpath: String,
    pub css_selector: String,
    /// Whether `id` identifies exactly one node in the document
    pub id_unique: bool,
    /// Whether `css_selector` matches exactly one node in the document
    pub css_unique: bool,
}

impl PickedElement {
    /// Candidate locators, best first: unique id, unique CSS selector, XPath, ambiguous CSS.
    pub fn locators(&self) -> Vec<Locator> {
        let mut candidates = Vec::new();
        if !self.id.is_empty() && self.id_unique {
            candidates.push(Locator::by_id(&self.id));
        }
        if !self.css_selector.is_empty() && self.css_unique {
            candidates.push(Locator::by_css(&self.css_selector));
        }
        if !self.xpath.is_empty() {
            candidates.push(Locator::by_xpath(&self.xpath));
        }
        if !self.css_selector.is_empty() && !self.css_unique {
            candidates.push(Locator::by_css(&self.css_selector));
        }
        candidates
    }

    /// The preferred single-strategy locator for this node
    pub fn locator(&self) -> Locator {
        self.locators().into_iter().next().unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        let tag = self.tag_name.to_lowercase();
        if !self.id.is_empty() {
            return format!("{tag}#{}", self.id);
        }
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("{tag}[name='{name}']"),
            _ => self.xpath.clone(),
        }
    }
}
