use crate::config::ScanOptions;
use crate::scanner::regex_scanner::{PatternTable, TextPattern};
use crate::scanner::{Check, CheckContext, FindingKind, Severity};
use async_trait::async_trait;

const RUST_PATTERNS: &[TextPattern] = &[
    TextPattern {
        regex: r"Command::new\s*\([^)]*\)\.arg\s*\([^)]*format!",
        message: "Command with format! macro - potential command injection",
        severity: Severity::Critical,
        remediation: "Avoid format! in command arguments. Use separate .arg() calls",
    },
    TextPattern {
        regex: r"std::process::Command",
        message: "Process command execution detected - review for injection",
        severity: Severity::Medium,
        remediation: "Ensure command arguments are properly sanitized",
    },
    TextPattern {
        regex: r"\.args?\s*\(\s*&?format!",
        message: "Dynamic command argument via format! - potential injection",
        severity: Severity::High,
        remediation: "Sanitize user input before passing to commands",
    },
    TextPattern {
        regex: r"unsafe\s*\{",
        message: "unsafe block detected - bypasses Rust's safety guarantees",
        severity: Severity::High,
        remediation: "Minimize unsafe usage. Document why it's necessary and safe",
    },
    TextPattern {
        regex: r"#\[no_mangle\]",
        message: "no_mangle attribute may indicate FFI boundary",
        severity: Severity::Medium,
        remediation: "Ensure proper input validation at FFI boundaries",
    },
    TextPattern {
        regex: r"std::mem::transmute",
        message: "transmute can cause undefined behavior",
        severity: Severity::High,
        remediation: "Avoid transmute. Use safe conversions like From/Into traits",
    },
    TextPattern {
        regex: r"std::mem::forget",
        message: "mem::forget may cause resource leaks",
        severity: Severity::Medium,
        remediation: "Use ManuallyDrop if intentional, otherwise ensure proper cleanup",
    },
    TextPattern {
        regex: r"std::fs::(read|write|File::open)\s*\([^)]*format!",
        message: "File operation with dynamic path - potential path traversal",
        severity: Severity::High,
        remediation: "Use Path::canonicalize() and validate against allowed directories",
    },
    TextPattern {
        regex: r"sql_query\s*\(\s*format!",
        message: "SQL query with format! - potential SQL injection",
        severity: Severity::Critical,
        remediation: "Use parameterized queries with bind() or query_as!()",
    },
    TextPattern {
        regex: r#"(api_key|secret|password|token|auth)\s*[:=]\s*["'][^"']{8,}["']"#,
        message: "Potential hardcoded secret detected",
        severity: Severity::High,
        remediation: "Use std::env::var() or a secrets manager",
    },
    TextPattern {
        regex: r"use\s+md5|use\s+sha1[^_]",
        message: "Weak hash algorithm (MD5/SHA1) detected",
        severity: Severity::Medium,
        remediation: "Use sha2 or blake3 crate for cryptographic hashing",
    },
    // 低危: 生产代码中的 panic 路径
    TextPattern {
        regex: r"\.unwrap\(\)|\.expect\s*\(",
        message: "unwrap()/expect() may cause panic in production",
        severity: Severity::Low,
        remediation: "Use proper error handling with ? operator or match",
    },
];

/// Regex table for `.rs` units.
pub struct RustSecurityCheck {
    table: PatternTable,
}

impl RustSecurityCheck {
    pub fn new() -> Self {
        Self {
            table: PatternTable::compile(FindingKind::RustSecurity, RUST_PATTERNS),
        }
    }
}

impl Default for RustSecurityCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Check for RustSecurityCheck {
    fn name(&self) -> &'static str {
        "rust-security"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        if !ctx.unit().has_extension("rs") {
            return Ok(());
        }
        let drafts = self.table.scan(ctx.text());
        ctx.add_findings(drafts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SourceUnit;

    async fn scan(text: &str, threshold: Option<Severity>) -> Vec<crate::scanner::Finding> {
        let mut ctx = CheckContext::new(SourceUnit::text_only("src/lib.rs", text), threshold);
        RustSecurityCheck::new()
            .check(&mut ctx, &ScanOptions::default())
            .await
            .unwrap();
        ctx.into_findings()
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(RustSecurityCheck::new().table.len(), RUST_PATTERNS.len());
    }

    #[tokio::test]
    async fn unsafe_and_unwrap() {
        let src = "fn main() {\n    let v = parse().unwrap();\n    unsafe { ptr.read() }\n}\n";
        let findings = scan(src, None).await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].line, 3);
        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[1].line, 2);
    }

    #[tokio::test]
    async fn threshold_drops_low_findings() {
        let findings = scan("let v = parse().unwrap();", Some(Severity::Medium)).await;
        assert!(findings.is_empty());
    }
}
