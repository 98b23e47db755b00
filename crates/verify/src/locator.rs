//! Element locators
//!
//! A locator is a chain of selectors, each one scoped to the matches of the
//! previous one, optionally narrowed to a single match by index. The string
//! form is what scenario files use:
//!
//! ```text
//! #email                              css (bare parts are CSS)
//! label=Password                      form control by its label text
//! role=button[name="Sign in"]         accessible role + name
//! text=Your Team                      element by visible text
//! testid=login-page                   [data-testid="login-page"]
//! css=header >> role=button >> nth=1  chained, second match
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

/// One selector in a locator chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    Label(String),
    Role {
        role: String,
        name: Option<String>,
    },
    Text(String),
    TestId(String),
}

impl Selector {
    fn descriptor(&self) -> Value {
        match self {
            Selector::Css(css) => json!({ "kind": "css", "value": css }),
            Selector::Label(label) => json!({ "kind": "label", "value": label }),
            Selector::Role { role, name } => json!({ "kind": "role", "role": role, "name": name }),
            Selector::Text(text) => json!({ "kind": "text", "value": text }),
            Selector::TestId(id) => {
                json!({ "kind": "css", "value": format!("[data-testid=\"{}\"]", id) })
            }
        }
    }

    fn value(&self) -> &str {
        match self {
            Selector::Css(v) | Selector::Label(v) | Selector::Text(v) | Selector::TestId(v) => v,
            Selector::Role { role, .. } => role,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "css={}", css),
            Selector::Label(label) => write!(f, "label={}", label),
            Selector::Role { role, name: Some(name) } => {
                write!(f, "role={}[name=\"{}\"]", role, name)
            }
            Selector::Role { role, name: None } => write!(f, "role={}", role),
            Selector::Text(text) => write!(f, "text={}", text),
            Selector::TestId(id) => write!(f, "testid={}", id),
        }
    }
}

/// Why a locator string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid locator '{input}': {reason}")]
pub struct LocatorParseError {
    pub input: String,
    pub reason: String,
}

/// A chain of selectors plus an optional match index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    chain: Vec<Selector>,
    nth: Option<usize>,
}

impl Locator {
    fn single(selector: Selector) -> Self {
        Self {
            chain: vec![selector],
            nth: None,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::single(Selector::Css(selector.into()))
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::single(Selector::Label(label.into()))
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::single(Selector::Role {
            role: role.into(),
            name: Some(name.into()),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::single(Selector::Text(text.into()))
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::single(Selector::TestId(id.into()))
    }

    /// Narrow the matches of this locator with another selector
    pub fn within(mut self, inner: Locator) -> Self {
        self.chain.extend(inner.chain);
        self.nth = inner.nth;
        self
    }

    /// Select the match at `index` (zero based)
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.chain
    }

    pub fn index(&self) -> Option<usize> {
        self.nth
    }

    /// Parse the string form
    pub fn parse(input: &str) -> Result<Self, LocatorParseError> {
        let fail = |reason: &str| LocatorParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut chain = Vec::new();
        let mut nth = None;

        for raw in input.split(">>") {
            let part = raw.trim();
            if part.is_empty() {
                return Err(fail("empty selector part"));
            }
            if nth.is_some() {
                return Err(fail("nth= must be the last part"));
            }

            if let Some(index) = part.strip_prefix("nth=") {
                let index = index
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| fail("nth= expects a non-negative integer"))?;
                nth = Some(index);
                continue;
            }

            let selector = match part.split_once('=') {
                Some(("css", v)) => Selector::Css(v.trim().to_string()),
                Some(("label", v)) => Selector::Label(v.trim().to_string()),
                Some(("text", v)) => Selector::Text(v.trim().to_string()),
                Some(("testid", v)) => Selector::TestId(v.trim().to_string()),
                Some(("role", v)) => parse_role(v.trim()).ok_or_else(|| {
                    fail("expected role=<role> or role=<role>[name=\"...\"]")
                })?,
                Some((prefix, _)) if is_engine_name(prefix) => {
                    return Err(fail(&format!("unknown selector engine '{}'", prefix)));
                }
                _ => Selector::Css(part.to_string()),
            };

            if selector.value().is_empty() {
                return Err(fail("selector value is empty"));
            }
            chain.push(selector);
        }

        if chain.is_empty() {
            return Err(fail("locator has no selectors"));
        }

        Ok(Self { chain, nth })
    }

    /// Structural check for locators built in code rather than parsed
    pub fn validate(&self) -> Result<(), LocatorParseError> {
        let fail = |reason: &str| LocatorParseError {
            input: self.to_string(),
            reason: reason.to_string(),
        };
        if self.chain.is_empty() {
            return Err(fail("locator has no selectors"));
        }
        if self.chain.iter().any(|s| s.value().trim().is_empty()) {
            return Err(fail("selector value is empty"));
        }
        Ok(())
    }

    /// JSON descriptor consumed by the in-page resolver
    pub fn descriptor(&self) -> Value {
        json!({
            "chain": self.chain.iter().map(Selector::descriptor).collect::<Vec<_>>(),
            "nth": self.nth,
        })
    }
}

/// `css=a[b=c]` must stay CSS, so only a bare lowercase word counts as an engine prefix
fn is_engine_name(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_lowercase() || c == '-')
}

fn parse_role(spec: &str) -> Option<Selector> {
    match spec.split_once('[') {
        None => {
            let role = spec.trim();
            (!role.is_empty() && !role.contains(']')).then(|| Selector::Role {
                role: role.to_string(),
                name: None,
            })
        }
        Some((role, rest)) => {
            let role = role.trim();
            let inner = rest.strip_suffix(']')?.trim();
            let value = inner.strip_prefix("name")?.trim_start().strip_prefix('=')?.trim();
            let name = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            if role.is_empty() || name.is_empty() {
                return None;
            }
            Some(Selector::Role {
                role: role.to_string(),
                name: Some(name.to_string()),
            })
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, " >> ")?;
            }
            write!(f, "{}", selector)?;
        }
        if let Some(nth) = self.nth {
            write!(f, " >> nth={}", nth)?;
        }
        Ok(())
    }
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Locator::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_selector_is_css() {
        let locator = Locator::parse("#email").unwrap();
        assert_eq!(locator.selectors(), &[Selector::Css("#email".into())]);
        assert_eq!(locator.index(), None);
    }

    #[test]
    fn test_css_with_attribute_equals_stays_css() {
        let locator = Locator::parse(r#"div[role="dialog"]"#).unwrap();
        assert_eq!(locator.selectors(), &[Selector::Css(r#"div[role="dialog"]"#.into())]);
    }

    #[test]
    fn test_role_with_name() {
        let locator = Locator::parse(r#"role=button[name="Sign in"]"#).unwrap();
        assert_eq!(
            locator.selectors(),
            &[Selector::Role {
                role: "button".into(),
                name: Some("Sign in".into()),
            }]
        );
        assert_eq!(locator, Locator::role("button", "Sign in"));
    }

    #[test]
    fn test_chain_with_nth() {
        let locator = Locator::parse("css=header >> role=button >> nth=1").unwrap();
        assert_eq!(locator.selectors().len(), 2);
        assert_eq!(locator.index(), Some(1));
        assert_eq!(locator.to_string(), "css=header >> role=button >> nth=1");
    }

    #[test]
    fn test_display_parses_back() {
        let locator = Locator::css("header").within(Locator::role("button", "Toggle theme"));
        assert_eq!(Locator::parse(&locator.to_string()).unwrap(), locator);
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "",
            "  ",
            "css=",
            "#a >> ",
            "nth=x",
            "nth=1 >> #a",
            "role=button[name=]",
            "xpath=//div",
        ] {
            assert!(Locator::parse(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_catches_empty_values() {
        assert!(Locator::label("").validate().is_err());
        assert!(Locator::label("Email").validate().is_ok());
    }

    #[test]
    fn test_test_id_descriptor_uses_attribute_selector() {
        let descriptor = Locator::test_id("login-page").descriptor();
        assert_eq!(descriptor["chain"][0]["value"], "[data-testid=\"login-page\"]");
    }
}
