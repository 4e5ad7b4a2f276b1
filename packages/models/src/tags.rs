//! Deny-list tag rules for selecting hazardous OSM geometries.
//!
//! Rules are written as `key=value` strings in config. A value of `*`
//! matches any value carried under that key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The value side of a [`TagRule`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagValue {
    /// Matches exactly this value.
    Exact(String),
    /// Matches any value for the key (`*`).
    Any,
}

/// A single `(key, value-or-wildcard)` deny-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagRule {
    /// OSM key, e.g. `landuse`.
    pub key: String,
    /// Value to match, or the wildcard.
    pub value: TagValue,
}

impl TagRule {
    /// Creates a rule matching `key=value` exactly.
    #[must_use]
    pub fn exact(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: TagValue::Exact(value.to_string()),
        }
    }

    /// Creates a rule matching any value under `key`.
    #[must_use]
    pub fn any(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: TagValue::Any,
        }
    }

    /// Returns `true` if the given tag pair satisfies this rule.
    #[must_use]
    pub fn matches(&self, key: &str, value: &str) -> bool {
        if self.key != key {
            return false;
        }
        match &self.value {
            TagValue::Any => true,
            TagValue::Exact(expected) => expected == value,
        }
    }

    /// The default "bad landing" deny-list.
    #[must_use]
    pub fn default_deny_list() -> Vec<Self> {
        vec![
            Self::exact("landuse", "residential"),
            Self::exact("landuse", "commercial"),
            Self::exact("landuse", "industrial"),
            Self::exact("landuse", "retail"),
            Self::exact("landuse", "institutional"),
            Self::exact("landuse", "education"),
            Self::exact("landuse", "civil"),
            Self::exact("place", "city_block"),
            Self::any("building"),
            Self::exact("natural", "water"),
        ]
    }
}

impl fmt::Display for TagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TagValue::Any => write!(f, "{}=*", self.key),
            TagValue::Exact(v) => write!(f, "{}={v}", self.key),
        }
    }
}

/// Error returned for a malformed `key=value` rule string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tag rule '{0}': expected 'key=value' or 'key=*'")]
pub struct InvalidTagRule(pub String);

impl FromStr for TagRule {
    type Err = InvalidTagRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| InvalidTagRule(s.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        if key.is_empty() || value.is_empty() {
            return Err(InvalidTagRule(s.to_string()));
        }

        Ok(if value == "*" {
            Self::any(key)
        } else {
            Self::exact(key, value)
        })
    }
}

impl TryFrom<String> for TagRule {
    type Error = InvalidTagRule;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TagRule> for String {
    fn from(value: TagRule) -> Self {
        value.to_string()
    }
}

/// What to do when a dataset carries none of the deny-list keys at all.
///
/// `AcceptAll` keeps every geometry of such a dataset without tagging it.
/// `RejectAll` drops them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeysPolicy {
    /// No filtering is applied; the whole dataset passes through.
    #[default]
    AcceptAll,
    /// Nothing passes.
    RejectAll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_and_wildcard_rules() {
        let exact: TagRule = "landuse=industrial".parse().unwrap();
        assert_eq!(exact, TagRule::exact("landuse", "industrial"));

        let any: TagRule = " building = * ".parse().unwrap();
        assert_eq!(any, TagRule::any("building"));
        assert_eq!(any.to_string(), "building=*");
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!("landuse".parse::<TagRule>().is_err());
        assert!("=water".parse::<TagRule>().is_err());
        assert!("natural=".parse::<TagRule>().is_err());
    }

    #[test]
    fn wildcard_matches_any_value_for_its_key_only() {
        let rule = TagRule::any("building");
        assert!(rule.matches("building", "yes"));
        assert!(rule.matches("building", "house"));
        assert!(!rule.matches("landuse", "yes"));
    }

    #[test]
    fn exact_rule_requires_equal_value() {
        let rule = TagRule::exact("natural", "water");
        assert!(rule.matches("natural", "water"));
        assert!(!rule.matches("natural", "wood"));
    }
}
