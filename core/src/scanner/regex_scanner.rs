use super::{FindingDraft, FindingKind, Severity};
use crate::ast::Position;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// One row of a textual detection table.
#[derive(Debug, Clone, Copy)]
pub struct TextPattern {
    pub regex: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub remediation: &'static str,
}

struct CompiledPattern {
    regex: Regex,
    message: String,
    severity: Severity,
    remediation: String,
}

/// Ordered, case-insensitive regex table producing one finding per match.
pub struct PatternTable {
    kind: FindingKind,
    patterns: Vec<CompiledPattern>,
}

impl PatternTable {
    pub fn new(kind: FindingKind) -> Self {
        Self {
            kind,
            patterns: Vec::new(),
        }
    }

    pub fn compile(kind: FindingKind, rows: &[TextPattern]) -> Self {
        let mut table = Self::new(kind);
        for row in rows {
            table.push(row.regex, row.message, row.severity, row.remediation);
        }
        table
    }

    /// Add a pattern; invalid expressions are dropped with a warning.
    pub fn push(
        &mut self,
        pattern: &str,
        message: impl Into<String>,
        severity: Severity,
        remediation: impl Into<String>,
    ) -> bool {
        match case_insensitive(pattern) {
            Ok(regex) => {
                self.patterns.push(CompiledPattern {
                    regex,
                    message: message.into(),
                    severity,
                    remediation: remediation.into(),
                });
                true
            }
            Err(e) => {
                warn!("Invalid {} pattern {:?}: {}", self.kind, pattern, e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn scan(&self, text: &str) -> Vec<FindingDraft> {
        let mut drafts = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                drafts.push(
                    FindingDraft::new(self.kind, pattern.severity, pattern.message.clone())
                        .at(Position::new(line_of_offset(text, m.start()), 1))
                        .with_code(m.as_str())
                        .with_remediation(pattern.remediation.clone()),
                );
            }
        }
        drafts
    }
}

pub fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// 1-based line containing byte `offset`.
pub fn line_of_offset(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}
