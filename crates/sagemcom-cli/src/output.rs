//! Rendering command results as text or JSON documents.

use sagemcom_core::error::ErrorResponse;
use sagemcom_core::PortForwardRule;
use serde_json::{json, Value};
use std::fmt::Write;
use url::Url;

/// The result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A rule was created.
    Opened(PortForwardRule),
    /// The rule on this external port was removed.
    Closed(u16),
    /// The current rules.
    Rules(Vec<PortForwardRule>),
    /// The admin page was handed to a browser.
    AdminOpened(Url),
}

impl Outcome {
    /// JSON success document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Opened(rule) => json!({
                "status": "success",
                "message": format!("Port forward {} opened", rule.name),
                "rule": rule,
            }),
            Self::Closed(port) => json!({
                "status": "success",
                "message": format!("Port forward on external port {port} closed"),
                "external_port": port,
            }),
            Self::Rules(rules) => json!({
                "status": "success",
                "count": rules.len(),
                "rules": rules,
            }),
            Self::AdminOpened(url) => json!({
                "status": "success",
                "message": "Opened router admin interface",
                "url": url.as_str(),
            }),
        }
    }

    /// Human-readable text.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Opened(rule) => format!("Opened {rule}"),
            Self::Closed(port) => format!("Closed port forward on external port {port}"),
            Self::Rules(rules) => rule_table(rules),
            Self::AdminOpened(url) => format!("Opened {url}"),
        }
    }
}

fn rule_table(rules: &[PortForwardRule]) -> String {
    if rules.is_empty() {
        return "No port forwards configured".to_string();
    }

    let name_width = rules
        .iter()
        .map(|rule| rule.name.len())
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or_default();

    let mut table = format!(
        "{:<name_width$}  {:>8}  {:<21}  {:<11}  {}\n",
        "NAME", "EXTERNAL", "INTERNAL", "PROTOCOL", "ENABLED"
    );
    for rule in rules {
        let internal = format!("{}:{}", rule.internal_address, rule.internal_port);
        // Writing to a String cannot fail.
        let _ = writeln!(
            table,
            "{:<name_width$}  {:>8}  {:<21}  {:<11}  {}",
            rule.name,
            rule.external_port,
            internal,
            rule.protocol.name(),
            if rule.enabled { "yes" } else { "no" }
        );
    }
    table.trim_end().to_string()
}

/// JSON error document.
#[must_use]
pub fn error_json(response: &ErrorResponse) -> Value {
    serde_json::to_value(response).unwrap_or_else(|_| {
        json!({
            "status": "error",
            "error": {"code": response.error.code, "message": response.error.message},
        })
    })
}
