// Skill Scanner Core Library
// 核心功能库，包含语法解析、检查器注册表、扫描编排和风险评分

mod ast;
mod checks;
mod config;
mod owasp;
mod providers;
mod remediation;
mod risk;
mod rules;
mod scanner;

// 重新导出常用类型
pub use ast::{extract_slice, get_position, ASTParser, ParsedSource, Position, Span};
pub use checks::{
    AgentSkillCheck, CodeInjectionCheck, CommandInjectionCheck, CustomRulesCheck,
    DependencyAuditCheck, FileSystemCheck, GoSecurityCheck, HardcodedSecretsCheck,
    MalwareScanCheck, McpDefinitionCheck, PythonSecurityCheck, RustSecurityCheck,
    SemanticAnalysisCheck,
};
pub use config::{RetryPolicy, ScanOptions};
pub use owasp::{map_to_owasp, OwaspInfo, OWASP_LLM_TOP_10};
pub use providers::{
    AnalysisProvider, DetectionStats, HashLookupProvider, ProviderError, RemediationProvider,
};
pub use remediation::{strip_code_fences, PromptRemediation};
pub use risk::{calculate_risk_score, CategoryBreakdown, Grade, RiskAssessment, RiskLevel};
pub use scanner::engine::{ScanEngine, DEFAULT_IGNORE_PATTERNS};
pub use scanner::manager::CheckRegistry;
pub use scanner::{
    contextual_severity, should_report, Check, CheckContext, Finding, FindingDraft, FindingKind,
    ScanResult, ScanSummary, Severity, SkippedEntry, SourceUnit, INLINE_IDENTIFIER,
};

// 规则系统
pub use rules::{loader::load_rules, model::CustomRule};

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Parse error: {0}")]
        Parse(String),

        #[error("Invalid scan target: {0}")]
        InvalidTarget(String),

        #[error("Check error: {0}")]
        Check(String),

        #[error("Provider error: {0}")]
        Provider(#[from] crate::providers::ProviderError),

        #[error("Config error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
