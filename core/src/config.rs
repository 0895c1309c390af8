// 扫描配置
use crate::error::{CoreError, Result};
use crate::rules::model::CustomRule;
use crate::scanner::engine::DEFAULT_IGNORE_PATTERNS;
use crate::scanner::Severity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backoff for calls to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanOptions {
    /// Names of the checks to run; `None` runs every registered check.
    pub checks: Option<Vec<String>>,
    /// Replaces the default ignore list when set.
    pub ignore_patterns: Option<Vec<String>>,
    pub severity_threshold: Option<Severity>,
    pub verbose: bool,
    pub auto_remediate: bool,
    pub custom_rules: Vec<CustomRule>,
    pub trusted_hosts: Vec<String>,
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            checks: None,
            ignore_patterns: None,
            severity_threshold: None,
            verbose: false,
            auto_remediate: false,
            custom_rules: Vec::new(),
            trusted_hosts: Vec::new(),
            retry: RetryPolicy::default(),
            max_concurrency: 8,
        }
    }
}

impl ScanOptions {
    /// Load options from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| matches!(e, "yaml" | "yml"));

        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
        }
    }

    pub fn check_enabled(&self, name: &str) -> bool {
        self.checks
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == name))
    }

    pub fn effective_ignore_patterns(&self) -> Vec<String> {
        match &self.ignore_patterns {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_checks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checks = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.severity_threshold = Some(threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn loads_yaml_with_camel_case_keys() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "checks: [code-injection]\nseverityThreshold: high\ntrustedHosts: [example.org]\nretry:\n  maxAttempts: 5"
        )
        .unwrap();

        let options = ScanOptions::from_path(file.path()).unwrap();
        assert!(options.check_enabled("code-injection"));
        assert!(!options.check_enabled("file-system"));
        assert_eq!(options.severity_threshold, Some(Severity::High));
        assert_eq!(options.trusted_hosts, vec!["example.org"]);
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.retry.initial_delay_ms, 1000);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ScanOptions::from_path(file.path()),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn default_ignores_apply_when_unset() {
        let options = ScanOptions::default();
        assert!(options
            .effective_ignore_patterns()
            .contains(&"node_modules".to_string()));
    }
}
