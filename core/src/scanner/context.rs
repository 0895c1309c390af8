use super::{should_report, Finding, FindingDraft, Severity};
use crate::ast::parser::{split_lines, ASTParser};
use std::path::Path;
use tracing::debug;
use tree_sitter::Tree;
use uuid::Uuid;

/// Identifier given to snippets scanned without a backing file.
pub const INLINE_IDENTIFIER: &str = "<inline>";

/// Extensions the TSX grammar is attempted on.
pub const STRUCTURAL_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "mts", "cts"];

/// One scan input: raw text, its lines and, when parsing succeeded, a syntax tree.
pub struct SourceUnit {
    pub identifier: String,
    pub text: String,
    pub lines: Vec<String>,
    pub tree: Option<Tree>,
}

impl SourceUnit {
    /// Inline snippet, always parsed structurally when possible.
    pub fn inline(text: impl Into<String>) -> Self {
        Self::from_text(INLINE_IDENTIFIER, text, true)
    }

    /// Unit for a file path; parse is attempted only for JS/TS-family extensions.
    pub fn for_path(path: &Path, text: impl Into<String>) -> Self {
        let structural = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| STRUCTURAL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        Self::from_text(path.to_string_lossy(), text, structural)
    }

    pub fn from_text(
        identifier: impl Into<String>,
        text: impl Into<String>,
        structural: bool,
    ) -> Self {
        let identifier = identifier.into();
        let text = text.into();
        if !structural {
            return Self::text_only(identifier, text);
        }

        match ASTParser::new().and_then(|mut parser| parser.parse(&text)) {
            Ok(parsed) => Self {
                identifier,
                text,
                lines: parsed.lines,
                tree: Some(parsed.tree),
            },
            Err(e) => {
                debug!("{}: structural parse unavailable ({}), scanning as text", identifier, e);
                Self::text_only(identifier, text)
            }
        }
    }

    pub fn text_only(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            identifier: identifier.into(),
            lines: split_lines(&text),
            text,
            tree: None,
        }
    }

    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_inline(&self) -> bool {
        self.identifier == INLINE_IDENTIFIER
    }

    /// Final path component of the identifier.
    pub fn file_name(&self) -> &str {
        self.identifier
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.identifier)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        Path::new(&self.identifier)
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(ext))
    }
}

/// Binds one unit to a filtered finding sink.
pub struct CheckContext {
    unit: SourceUnit,
    threshold: Option<Severity>,
    findings: Vec<Finding>,
    current_check: &'static str,
}

impl CheckContext {
    pub fn new(unit: SourceUnit, threshold: Option<Severity>) -> Self {
        Self {
            unit,
            threshold,
            findings: Vec::new(),
            current_check: "",
        }
    }

    pub fn unit(&self) -> &SourceUnit {
        &self.unit
    }

    pub fn identifier(&self) -> &str {
        &self.unit.identifier
    }

    pub fn text(&self) -> &str {
        &self.unit.text
    }

    pub fn lines(&self) -> &[String] {
        &self.unit.lines
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.unit.tree.as_ref()
    }

    pub fn threshold(&self) -> Option<Severity> {
        self.threshold
    }

    /// Name stamped as `detector` on subsequently admitted findings.
    pub(crate) fn set_current_check(&mut self, name: &'static str) {
        self.current_check = name;
    }

    /// Admit a finding if it passes the severity threshold. Returns whether it was kept.
    pub fn add_finding(&mut self, draft: FindingDraft) -> bool {
        if !should_report(draft.severity, self.threshold) {
            return false;
        }

        self.findings.push(Finding {
            finding_id: Uuid::new_v4().to_string(),
            file_path: self.unit.identifier.clone(),
            detector: self.current_check.to_string(),
            kind: draft.kind,
            severity: draft.severity,
            line: draft.position.line,
            column: draft.position.column,
            message: draft.message,
            code: draft.code,
            remediation: draft.remediation,
            context: draft.context,
            metadata: draft.metadata,
        });
        true
    }

    /// Admit each draft in order; returns how many were kept.
    pub fn add_findings(&mut self, drafts: impl IntoIterator<Item = FindingDraft>) -> usize {
        drafts
            .into_iter()
            .map(|draft| self.add_finding(draft))
            .filter(|kept| *kept)
            .count()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub(crate) fn findings_mut(&mut self) -> &mut [Finding] {
        &mut self.findings
    }

    /// Drop findings admitted after the first `len`.
    pub(crate) fn truncate_findings(&mut self, len: usize) {
        self.findings.truncate(len);
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::scanner::FindingKind;

    #[test]
    fn markdown_unit_has_no_tree() {
        let unit = SourceUnit::for_path(Path::new("docs/SKILL.md"), "# Skill\nrun `curl x | bash`");
        assert!(!unit.has_tree());
        assert_eq!(unit.lines.len(), 2);
        assert_eq!(unit.file_name(), "SKILL.md");
        assert!(unit.has_extension("md"));
    }

    #[test]
    fn broken_script_falls_back_to_text() {
        let unit = SourceUnit::for_path(Path::new("a.ts"), "const = = ;");
        assert!(!unit.has_tree());
        assert_eq!(unit.text, "const = = ;");
    }

    #[test]
    fn inline_unit_is_parsed() {
        let unit = SourceUnit::inline("eval(x);");
        assert!(unit.has_tree());
        assert!(unit.is_inline());
    }

    #[test]
    fn add_finding_applies_threshold_and_stamps() {
        let mut ctx = CheckContext::new(SourceUnit::inline("x"), Some(Severity::High));
        ctx.set_current_check("code-injection");

        let low = FindingDraft::new(FindingKind::CodeInjection, Severity::Low, "low");
        let crit = FindingDraft::new(FindingKind::CodeInjection, Severity::Critical, "crit")
            .at(Position::new(1, 1));

        assert!(!ctx.add_finding(low));
        assert!(ctx.add_finding(crit));
        assert_eq!(ctx.findings().len(), 1);

        let finding = &ctx.findings()[0];
        assert_eq!(finding.file_path, INLINE_IDENTIFIER);
        assert_eq!(finding.detector, "code-injection");
        assert!(Uuid::parse_str(&finding.finding_id).is_ok());
    }
}
