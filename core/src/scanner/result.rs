use super::{Finding, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An entry the walk could not scan, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total_files: usize,
    pub files_with_issues: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
}

impl ScanSummary {
    pub fn from_findings(total_files: usize, findings: &[Finding]) -> Self {
        let files: HashSet<&str> = findings.iter().map(|f| f.file_path.as_str()).collect();
        let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
        Self {
            total_files,
            files_with_issues: files.len(),
            critical_count: count(Severity::Critical),
            high_count: count(Severity::High),
            medium_count: count(Severity::Medium),
            low_count: count(Severity::Low),
        }
    }

    pub fn total_findings(&self) -> usize {
        self.critical_count + self.high_count + self.medium_count + self.low_count
    }
}

/// 扫描结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub findings: Vec<Finding>,
    pub summary: ScanSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEntry>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(findings: Vec<Finding>, total_files: usize, skipped: Vec<SkippedEntry>) -> Self {
        let summary = ScanSummary::from_findings(total_files, &findings);
        Self {
            findings,
            summary,
            skipped,
            scanned_at: Utc::now(),
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}
