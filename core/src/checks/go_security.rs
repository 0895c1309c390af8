use crate::config::ScanOptions;
use crate::scanner::regex_scanner::{PatternTable, TextPattern};
use crate::scanner::{Check, CheckContext, FindingKind, Severity};
use async_trait::async_trait;

const GO_PATTERNS: &[TextPattern] = &[
    TextPattern {
        regex: r"exec\.Command\s*\(\s*[^,]+\+",
        message: "exec.Command with string concatenation - potential command injection",
        severity: Severity::Critical,
        remediation: "Avoid string concatenation. Pass arguments as separate parameters",
    },
    TextPattern {
        regex: r#"exec\.Command\s*\(\s*["'](?:sh|bash|cmd)['"]\s*,\s*["']-c['"]"#,
        message: "Shell execution via exec.Command - vulnerable to injection",
        severity: Severity::Critical,
        remediation: "Avoid shell invocation. Use exec.Command directly with the binary",
    },
    TextPattern {
        regex: r"os/exec",
        message: "os/exec package imported - review for command injection",
        severity: Severity::Medium,
        remediation: "Ensure all command arguments are properly sanitized",
    },
    // SQL 关键字必须出现在 Sprintf 调用内部
    TextPattern {
        regex: r"fmt\.Sprintf\s*\([^)]*(?:SELECT|INSERT|UPDATE|DELETE)",
        message: "Potential SQL injection via fmt.Sprintf",
        severity: Severity::Critical,
        remediation: "Use parameterized queries with database/sql",
    },
    TextPattern {
        regex: r"db\.(Query|Exec)\s*\([^)]*\+",
        message: "SQL query with string concatenation - potential injection",
        severity: Severity::Critical,
        remediation: "Use prepared statements with ? placeholders",
    },
    TextPattern {
        regex: r"os\.Open\s*\([^)]*\+",
        message: "File open with dynamic path - potential path traversal",
        severity: Severity::High,
        remediation: "Use filepath.Clean() and validate paths against a base directory",
    },
    TextPattern {
        regex: r"ioutil\.ReadFile\s*\([^)]*\+",
        message: "ReadFile with dynamic path - potential path traversal",
        severity: Severity::High,
        remediation: "Use filepath.Clean() and validate paths",
    },
    TextPattern {
        regex: r#"(apiKey|secret|password|token|auth)\s*:?=\s*["'][^"']{8,}["']"#,
        message: "Potential hardcoded secret detected",
        severity: Severity::High,
        remediation: "Use environment variables via os.Getenv()",
    },
    TextPattern {
        regex: r"http\.Get\s*\([^)]*\+",
        message: "HTTP request with dynamic URL - potential SSRF",
        severity: Severity::High,
        remediation: "Validate and sanitize URLs before making requests",
    },
    TextPattern {
        regex: r"crypto/md5|crypto/sha1",
        message: "Weak hash algorithm (MD5/SHA1) detected",
        severity: Severity::Medium,
        remediation: "Use crypto/sha256 or stronger for security purposes",
    },
    TextPattern {
        regex: r"unsafe\.Pointer",
        message: "unsafe.Pointer usage may bypass Go's memory safety",
        severity: Severity::Medium,
        remediation: "Avoid unsafe package unless absolutely necessary. Review carefully",
    },
];

/// Regex table for `.go` units.
pub struct GoSecurityCheck {
    table: PatternTable,
}

impl GoSecurityCheck {
    pub fn new() -> Self {
        Self {
            table: PatternTable::compile(FindingKind::GoSecurity, GO_PATTERNS),
        }
    }
}

impl Default for GoSecurityCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Check for GoSecurityCheck {
    fn name(&self) -> &'static str {
        "go-security"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        if !ctx.unit().has_extension("go") {
            return Ok(());
        }
        let drafts = self.table.scan(ctx.text());
        ctx.add_findings(drafts);
        Ok(())
    }
}
