//! Case-insensitive text matching against node attributes

use crate::platforms::UiNode;
use crate::AutomationError;

/// Case-fold a string for matching.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
}

/// The text the user is looking for, trimmed and case-folded once up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    raw: String,
    needle: String,
}

impl SearchTarget {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let needle = normalize(raw.trim());
        Self { raw, needle }
    }

    /// The target as originally supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// An empty target matches nothing.
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    /// Whether one attribute value contains the target.
    pub fn found_in(&self, value: Option<&str>) -> bool {
        if self.is_empty() {
            return false;
        }
        value.is_some_and(|v| normalize(v).contains(&self.needle))
    }

    /// Whether any of text, description or identifier contains the target.
    pub fn matches_fields(&self, fields: &MatchFields<'_>) -> bool {
        self.found_in(fields.text)
            || self.found_in(fields.description)
            || self.found_in(fields.element_id)
    }

    /// Read the searchable attributes of `node` and test them.
    pub fn matches_node(&self, node: &dyn UiNode) -> Result<bool, AutomationError> {
        if self.is_empty() {
            return Ok(false);
        }
        let text = node.text()?;
        let description = node.description()?;
        let element_id = node.element_id()?;
        Ok(self.matches_fields(&MatchFields {
            text: text.as_deref(),
            description: description.as_deref(),
            element_id: element_id.as_deref(),
        }))
    }
}

impl From<&str> for SearchTarget {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SearchTarget {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The searchable attributes of a node.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFields<'a> {
    pub text: Option<&'a str>,
    pub description: Option<&'a str>,
    pub element_id: Option<&'a str>,
}

/// Case-insensitive substring match of `target` against any of the fields.
pub fn matches(fields: &MatchFields<'_>, target: &str) -> bool {
    SearchTarget::new(target).matches_fields(fields)
}
