use crate::scanner::Severity;
use serde::{Deserialize, Serialize};

/// User-supplied textual rule: every pattern is matched case-insensitively over the unit.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub remediation: String,
    #[serde(default, alias = "owasp_id", skip_serializing_if = "Option::is_none")]
    pub owasp_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub rules: Vec<CustomRule>,
}
