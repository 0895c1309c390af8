use crate::config::ScanOptions;
use crate::scanner::regex_scanner::{PatternTable, TextPattern};
use crate::scanner::{Check, CheckContext, FindingKind, Severity};
use async_trait::async_trait;

const PYTHON_PATTERNS: &[TextPattern] = &[
    // command injection
    TextPattern {
        regex: r"os\.system\s*\(",
        message: "Dangerous use of os.system() - susceptible to command injection",
        severity: Severity::Critical,
        remediation: "Use subprocess.run() with shell=False and a list of arguments instead",
    },
    TextPattern {
        regex: r"subprocess\.(call|run|Popen)\s*\([^)]*shell\s*=\s*True",
        message: "subprocess with shell=True is vulnerable to command injection",
        severity: Severity::Critical,
        remediation: "Set shell=False and pass arguments as a list",
    },
    TextPattern {
        regex: r"os\.popen\s*\(",
        message: "os.popen() is deprecated and vulnerable to injection",
        severity: Severity::High,
        remediation: "Use subprocess.run() with shell=False",
    },
    // code execution
    TextPattern {
        regex: r"\beval\s*\(",
        message: "Use of eval() can execute arbitrary code",
        severity: Severity::Critical,
        remediation: "Avoid eval(). Use ast.literal_eval() for safe literal parsing",
    },
    TextPattern {
        regex: r"\bexec\s*\(",
        message: "Use of exec() can execute arbitrary code",
        severity: Severity::Critical,
        remediation: "Avoid exec(). Consider safer alternatives like importlib",
    },
    TextPattern {
        regex: r#"compile\s*\([^)]+,\s*[^)]+,\s*['"]exec['"]\)"#,
        message: "compile() with 'exec' mode can execute arbitrary code",
        severity: Severity::High,
        remediation: "Avoid dynamic code compilation from untrusted sources",
    },
    // deserialization
    TextPattern {
        regex: r"pickle\.(load|loads)\s*\(",
        message: "pickle deserialization can execute arbitrary code",
        severity: Severity::Critical,
        remediation: "Never unpickle data from untrusted sources. Use JSON instead",
    },
    TextPattern {
        regex: r"yaml\.load\s*\([^)]*\)",
        message: "yaml.load() without Loader is unsafe",
        severity: Severity::High,
        remediation: "Use yaml.safe_load() instead",
    },
    // SQL
    TextPattern {
        regex: r#"execute\s*\(\s*f['"]"#,
        message: "Potential SQL injection via f-string in execute()",
        severity: Severity::Critical,
        remediation: "Use parameterized queries with ? or %s placeholders",
    },
    TextPattern {
        regex: r"execute\s*\([^)]*%\s*\(",
        message: "Potential SQL injection via % formatting",
        severity: Severity::Critical,
        remediation: "Use parameterized queries with ? or %s placeholders",
    },
    TextPattern {
        regex: r#"(api[_-]?key|secret|password|token|auth)\s*=\s*['"][^'"]{8,}['"]"#,
        message: "Potential hardcoded secret detected",
        severity: Severity::High,
        remediation: "Use environment variables or a secrets manager",
    },
    TextPattern {
        regex: r"from\s+ctypes\s+import|import\s+ctypes",
        message: "ctypes usage may indicate low-level system access",
        severity: Severity::Medium,
        remediation: "Review ctypes usage for potential security implications",
    },
];

/// Regex table for `.py` units.
pub struct PythonSecurityCheck {
    table: PatternTable,
}

impl PythonSecurityCheck {
    pub fn new() -> Self {
        Self {
            table: PatternTable::compile(FindingKind::PythonSecurity, PYTHON_PATTERNS),
        }
    }
}

impl Default for PythonSecurityCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Check for PythonSecurityCheck {
    fn name(&self) -> &'static str {
        "python-security"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        if !ctx.unit().has_extension("py") {
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

    async fn scan(identifier: &str, text: &str) -> Vec<crate::scanner::Finding> {
        let mut ctx = CheckContext::new(SourceUnit::text_only(identifier, text), None);
        PythonSecurityCheck::new()
            .check(&mut ctx, &ScanOptions::default())
            .await
            .unwrap();
        ctx.into_findings()
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(PythonSecurityCheck::new().table.len(), PYTHON_PATTERNS.len());
    }

    #[tokio::test]
    async fn flags_shell_and_pickle() {
        let findings = scan(
            "tool.py",
            "import os, pickle\nos.system(cmd)\nsubprocess.run(cmd, shell=True)\ndata = pickle.loads(blob)\n",
        )
        .await;
        let lines: Vec<_> = findings.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
        assert!(findings.iter().all(|f| f.kind == FindingKind::PythonSecurity));
        assert!(findings.iter().all(|f| f.column == 1));
    }

    #[tokio::test]
    async fn ignores_other_extensions() {
        assert!(scan("tool.js", "os.system(cmd)").await.is_empty());
    }
}
