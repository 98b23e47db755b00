//! In-page locator resolution.
//!
//! The resolver lives in `scripts/locator.js` so editors can highlight it; it
//! is bundled at compile time and invoked with a locator descriptor, an
//! operation name and one argument.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{SessionError, SessionErrorKind};
use crate::locator::Locator;
use crate::session::Located;

/// Embedded contents of `scripts/locator.js`.
pub const LOCATOR_SCRIPT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/locator.js"));

/// Attribute used to hand a resolved element over to a native CDP click
pub const TARGET_ATTRIBUTE: &str = "data-uiverify-target";

#[derive(Debug, Clone, Copy)]
pub enum DomOp {
    Locate,
    Fill,
    Mark,
}

impl DomOp {
    fn as_str(&self) -> &'static str {
        match self {
            DomOp::Locate => "locate",
            DomOp::Fill => "fill",
            DomOp::Mark => "mark",
        }
    }
}

/// Build the expression evaluated in the page
pub fn expression(locator: &Locator, op: DomOp, arg: &str) -> String {
    format!(
        "({})({}, {}, {})",
        LOCATOR_SCRIPT.trim(),
        locator.descriptor(),
        Value::String(op.as_str().to_string()),
        Value::String(arg.to_string()),
    )
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    located: Located,
}

/// Turn the resolver's reply into a snapshot or a typed failure
pub fn interpret(locator: &Locator, value: Value) -> Result<Located, SessionError> {
    let reply: Reply = serde_json::from_value(value).map_err(|e| {
        SessionError::protocol(format!("unexpected resolver reply for {}: {}", locator, e))
    })?;

    match reply.error.as_deref() {
        None => Ok(reply.located),
        Some(code) => {
            let kind = match code {
                "invalid_selector" => SessionErrorKind::InvalidSelector,
                "not_found" => SessionErrorKind::ElementNotFound,
                _ => SessionErrorKind::Protocol,
            };
            let message = reply.message.unwrap_or_else(|| code.to_string());
            Err(SessionError::new(kind, format!("{}: {}", locator, message)))
        }
    }
}
