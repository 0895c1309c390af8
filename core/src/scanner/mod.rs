// Scanner module - 扫描器模块
// 定义检查器的核心接口和发现结果类型

pub mod context;
pub mod engine;
pub mod manager;
pub mod regex_scanner;
pub mod result;

pub use context::{CheckContext, SourceUnit, INLINE_IDENTIFIER};
pub use result::{ScanResult, ScanSummary, SkippedEntry};

use crate::ast::Position;
use crate::config::ScanOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 严重等级, ordered low < medium < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Penalty points used by the risk score.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 2.0,
            Severity::Medium => 5.0,
            Severity::High => 15.0,
            Severity::Critical => 25.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// 发现类别: one tag per distinct detection, independent of the producing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    CommandInjection,
    CodeInjection,
    FileSystem,
    HardcodedSecret,
    SemanticAnalysis,
    MalwareScan,
    DependencyAudit,
    AgentSkill,
    CustomRule,
    PythonSecurity,
    GoSecurity,
    RustSecurity,
    McpDefinition,
    ToolSchema,
    ExcessiveAgency,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::CommandInjection => "command-injection",
            FindingKind::CodeInjection => "code-injection",
            FindingKind::FileSystem => "file-system",
            FindingKind::HardcodedSecret => "hardcoded-secret",
            FindingKind::SemanticAnalysis => "semantic-analysis",
            FindingKind::MalwareScan => "malware-scan",
            FindingKind::DependencyAudit => "dependency-audit",
            FindingKind::AgentSkill => "agent-skill",
            FindingKind::CustomRule => "custom-rule",
            FindingKind::PythonSecurity => "python-security",
            FindingKind::GoSecurity => "go-security",
            FindingKind::RustSecurity => "rust-security",
            FindingKind::McpDefinition => "mcp-definition",
            FindingKind::ToolSchema => "tool-schema",
            FindingKind::ExcessiveAgency => "excessive-agency",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 漏洞发现结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub finding_id: String,
    pub file_path: String,
    pub detector: String,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub code: String,
    pub remediation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Finding {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// A finding before the context stamps identity and location of the unit on it.
#[derive(Debug, Clone)]
pub struct FindingDraft {
    pub kind: FindingKind,
    pub severity: Severity,
    pub position: Position,
    pub message: String,
    pub code: String,
    pub remediation: String,
    pub context: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FindingDraft {
    pub fn new(kind: FindingKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            position: Position::UNKNOWN,
            message: message.into(),
            code: String::new(),
            remediation: String::new(),
            context: None,
            metadata: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.to_string(), value.into());
        self
    }
}

/// 检查器 trait - 所有检查器都需要实现此接口
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable name used for `ScanOptions::checks` selection.
    fn name(&self) -> &'static str;

    /// Inspect the unit bound to `ctx`, reporting through `ctx.add_finding`.
    async fn check(&self, ctx: &mut CheckContext, options: &ScanOptions) -> anyhow::Result<()>;
}

/// Whether a finding of `severity` passes the configured threshold.
pub fn should_report(severity: Severity, threshold: Option<Severity>) -> bool {
    threshold.map_or(true, |min| severity >= min)
}

/// Severity derived from a short description of what was matched.
pub fn contextual_severity(kind: FindingKind, context: &str) -> Severity {
    match kind {
        FindingKind::CommandInjection => {
            if context.contains("user") || context.contains("input") {
                Severity::Critical
            } else {
                Severity::High
            }
        }
        FindingKind::CodeInjection => {
            if context.contains("eval") || context.contains("Function") {
                Severity::Critical
            } else {
                Severity::High
            }
        }
        FindingKind::FileSystem => {
            if context.contains("write")
                || context.contains("append")
                || context.contains("traversal")
            {
                Severity::High
            } else {
                Severity::Medium
            }
        }
        FindingKind::HardcodedSecret => {
            if context.contains("private") || context.contains("key") {
                Severity::Critical
            } else if context.contains("password") || context.contains("token") {
                Severity::High
            } else {
                Severity::Medium
            }
        }
        _ => Severity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_and_parsing() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("urgent".parse::<Severity>().is_err());
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[test]
    fn threshold_filter() {
        assert!(should_report(Severity::Low, None));
        assert!(!should_report(Severity::Medium, Some(Severity::High)));
        assert!(should_report(Severity::Critical, Some(Severity::High)));
        assert!(should_report(Severity::High, Some(Severity::High)));
    }

    #[test]
    fn contextual_severity_rules() {
        use FindingKind::*;
        assert_eq!(
            contextual_severity(CommandInjection, "exec with dynamic input"),
            Severity::Critical
        );
        assert_eq!(
            contextual_severity(CommandInjection, "exec with template literal"),
            Severity::High
        );
        assert_eq!(contextual_severity(CodeInjection, "eval"), Severity::Critical);
        assert_eq!(contextual_severity(CodeInjection, "vm.runInContext"), Severity::High);
        assert_eq!(contextual_severity(FileSystem, "read"), Severity::Medium);
        assert_eq!(contextual_severity(FileSystem, "read with path traversal"), Severity::High);
        assert_eq!(contextual_severity(FileSystem, "write"), Severity::High);
    }

    #[test]
    fn finding_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&FindingKind::HardcodedSecret).unwrap();
        assert_eq!(json, "\"hardcoded-secret\"");
        assert_eq!(FindingKind::ExcessiveAgency.as_str(), "excessive-agency");
    }

    #[test]
    fn draft_builder_collects_metadata() {
        let draft = FindingDraft::new(FindingKind::CustomRule, Severity::Low, "msg")
            .at(Position::new(3, 1))
            .with_metadata("ruleId", "R1")
            .with_metadata("customRule", true);
        let meta = draft.metadata.unwrap();
        assert_eq!(meta["ruleId"], "R1");
        assert_eq!(meta["customRule"], true);
        assert_eq!(draft.position.line, 3);
    }
}
