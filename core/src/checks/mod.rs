// Built-in checks - 内置检查器
// 结构化检查基于语法树，文本检查基于正则表

use regex::Regex;
use tracing::warn;

/// Declares `fn $name() -> Option<&'static Regex>` compiling `$pattern` once.
macro_rules! static_regex {
    ($vis:vis fn $name:ident() = $pattern:expr;) => {
        $vis fn $name() -> Option<&'static regex::Regex> {
            static CELL: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();
            CELL.get_or_init(|| crate::checks::compile_builtin($pattern))
                .as_ref()
        }
    };
}

pub mod agent_skill;
pub mod code_injection;
pub mod command_injection;
pub mod custom_rules;
pub mod dependency_audit;
pub mod file_system;
pub mod go_security;
pub mod hardcoded_secrets;
pub mod malware_scan;
pub mod mcp_definition;
pub mod python_security;
pub mod rust_security;
pub mod semantic_analysis;

pub use agent_skill::AgentSkillCheck;
pub use code_injection::CodeInjectionCheck;
pub use command_injection::CommandInjectionCheck;
pub use custom_rules::CustomRulesCheck;
pub use dependency_audit::DependencyAuditCheck;
pub use file_system::FileSystemCheck;
pub use go_security::GoSecurityCheck;
pub use hardcoded_secrets::HardcodedSecretsCheck;
pub use malware_scan::MalwareScanCheck;
pub use mcp_definition::McpDefinitionCheck;
pub use python_security::PythonSecurityCheck;
pub use rust_security::RustSecurityCheck;
pub use semantic_analysis::SemanticAnalysisCheck;

pub(crate) fn compile_builtin(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid built-in pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// `; | & $` backtick, backslash, `*`, `<`, `>`
pub(crate) fn contains_shell_metacharacters(s: &str) -> bool {
    s.chars()
        .any(|c| matches!(c, ';' | '|' | '&' | '$' | '`' | '\\' | '*' | '<' | '>'))
}

pub(crate) fn has_path_traversal(s: &str) -> bool {
    s.contains("../") || s.contains("..\\")
}

const PLACEHOLDER_VALUES: &[&str] = &[
    "test",
    "mock",
    "example",
    "dummy",
    "sample",
    "fake",
    "placeholder",
    "xxx",
    "12345",
    "changeme",
    "redacted",
];

/// Exact, case-insensitive match against well-known dummy values.
pub(crate) fn is_placeholder_value(value: &str) -> bool {
    PLACEHOLDER_VALUES
        .iter()
        .any(|p| value.eq_ignore_ascii_case(p))
}

/// At most `max` characters of `s`.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
