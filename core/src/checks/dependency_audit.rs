use crate::ast::Position;
use crate::config::ScanOptions;
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Packages with a history of hijacking, sabotage or deprecation, and what to use instead.
const DANGEROUS_PACKAGES: &[(&str, &str)] = &[
    (
        "request",
        "The 'request' package is deprecated. Use 'axios' or 'node-fetch' instead.",
    ),
    (
        "colors",
        "Historical incidents with self-destructing versions. Use 'picocolors' or 'chalk'.",
    ),
    ("event-stream", "History of being hijacked to steal cryptocurrency."),
    ("node-ipc", "History of malicious code targeting specific locales."),
    ("flatmap-stream", "Associated with past supply chain attacks."),
];

const TYPOSQUAT_MARKERS: &[&str] = &["googl-", "amazn-", "gemini-ai-scam"];

/// `package.json` dependency audit.
pub struct DependencyAuditCheck;

#[async_trait]
impl Check for DependencyAuditCheck {
    fn name(&self) -> &'static str {
        "dependency-audit"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        if !ctx.identifier().ends_with("package.json") {
            return Ok(());
        }
        ctx.add_findings(analyze(ctx.unit()));
        Ok(())
    }
}

/// `dependencies` then `devDependencies`; a later entry replaces the version of an earlier one.
fn declared_dependencies(manifest: &Value) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        let Some(entries) = manifest.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, version) in entries {
            let version = version
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| version.to_string());
            match merged.iter_mut().find(|(existing, _)| existing == name) {
                Some(entry) => entry.1 = version,
                None => merged.push((name.clone(), version)),
            }
        }
    }
    merged
}

static_regex! {
    fn section_open() = r#""(?:dependencies|devDependencies)"\s*:\s*\{"#;
}

/// Byte ranges of the `dependencies` / `devDependencies` object bodies.
fn section_spans(text: &str) -> Vec<(usize, usize)> {
    let Some(re) = section_open() else {
        return Vec::new();
    };
    re.find_iter(text)
        .filter_map(|m| closing_brace(text, m.end()).map(|end| (m.end(), end)))
        .collect()
}

/// Offset of the `}` closing the object whose body starts at `from`; braces in strings are skipped.
fn closing_brace(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[from..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Where `name` is declared as a key inside one of `spans`, else 1:1.
fn key_position(text: &str, spans: &[(usize, usize)], name: &str) -> Position {
    let needle = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name));
    spans
        .iter()
        .find_map(|&(start, end)| {
            let body = &text[start..end];
            body.match_indices(needle.as_str())
                .map(|(i, _)| i)
                .find(|&i| body[i + needle.len()..].trim_start().starts_with(':'))
                .map(|i| start + i)
        })
        .map_or(Position::new(1, 1), |offset| Position::at_offset(text, offset))
}

fn analyze(unit: &SourceUnit) -> Vec<FindingDraft> {
    let manifest: Value = match serde_json::from_str(&unit.text) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!("{}: not valid JSON, skipping dependency audit: {}", unit.identifier, e);
            return Vec::new();
        }
    };

    let spans = section_spans(&unit.text);
    let mut drafts = Vec::new();
    for (name, version) in declared_dependencies(&manifest) {
        let code = format!("\"{}\": \"{}\"", name, version);
        let position = key_position(&unit.text, &spans, &name);

        if let Some((_, advice)) = DANGEROUS_PACKAGES.iter().find(|(pkg, _)| *pkg == name) {
            drafts.push(
                FindingDraft::new(
                    FindingKind::DependencyAudit,
                    Severity::High,
                    format!("Vulnerable/Deprecated dependency detected: \"{}\"", name),
                )
                .at(position)
                .with_code(code.clone())
                .with_remediation(*advice),
            );
        }

        if TYPOSQUAT_MARKERS.iter().any(|marker| name.contains(marker)) {
            drafts.push(
                FindingDraft::new(
                    FindingKind::DependencyAudit,
                    Severity::Critical,
                    format!(
                        "Potential typosquatting or malicious package name detected: \"{}\"",
                        name
                    ),
                )
                .at(position)
                .with_code(code)
                .with_remediation("Verify the package name and ownership on npmjs.com."),
            );
        }
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Vec<FindingDraft> {
        analyze(&SourceUnit::text_only("app/package.json", text))
    }

    #[test]
    fn dangerous_and_typosquat_packages() {
        let pkg = r#"{
  "name": "demo",
  "dependencies": {
    "lodash": "^4.17.21",
    "event-stream": "3.3.6"
  },
  "devDependencies": {
    "googl-auth": "1.0.0"
  }
}"#;
        let drafts = run(pkg);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].severity, Severity::High);
        assert_eq!(drafts[0].code, "\"event-stream\": \"3.3.6\"");
        assert_eq!(drafts[0].position, Position::new(5, 5));
        assert_eq!(
            drafts[0].remediation,
            "History of being hijacked to steal cryptocurrency."
        );
        assert_eq!(drafts[1].severity, Severity::Critical);
        assert_eq!(drafts[1].position.line, 8);
    }

    #[test]
    fn position_ignores_same_named_keys_outside_dependencies() {
        let pkg = r#"{
  "scripts": { "request": "node fetch.js" },
  "config": { "note": "{ \"request\": 1 }" },
  "dependencies": {
    "request": "2.88.2"
  }
}"#;
        let drafts = run(pkg);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].position, Position::new(5, 5));
    }

    #[test]
    fn dev_dependency_version_wins() {
        let manifest: Value = serde_json::from_str(
            r#"{"dependencies": {"colors": "1.4.1"}, "devDependencies": {"colors": "1.4.0"}}"#,
        )
        .unwrap();
        assert_eq!(
            declared_dependencies(&manifest),
            vec![("colors".to_string(), "1.4.0".to_string())]
        );
    }

    #[test]
    fn malformed_manifest_is_ignored() {
        assert!(run("{ \"dependencies\": { \"request\": ").is_empty());
    }
}
