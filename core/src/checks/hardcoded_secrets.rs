use super::{compile_builtin, is_placeholder_value};
use crate::ast::parser::floor_char_boundary;
use crate::ast::query::{node_text, nodes_of_kind, string_value};
use crate::ast::{extract_slice, get_position, Position, Span};
use crate::config::ScanOptions;
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tree_sitter::{Node, Tree};

const REMEDIATION: &str = "Use environment variables or a secure secrets manager. Never commit secrets to source control.";
const ENV_ACCESSORS: &[&str] = &["process.env.", "import.meta.env."];
const ENV_LOOKBEHIND: usize = 50;
const TEMPLATE_SECRET: &str = "Template literal used for secret-like variable - ensure this does not construct secrets from untrusted input";

/// Identifier-name classes, first match wins.
const NAME_CLASSES: &[(&str, &str, Severity)] = &[
    (r"api[_-]?key", "API key", Severity::High),
    (r"api[_-]?secret", "API secret", Severity::High),
    (r"^password$|^passwd$", "password", Severity::High),
    (r"secret", "secret", Severity::Medium),
    (r"token", "token", Severity::High),
    (r"auth", "auth credential", Severity::High),
    (r"credential", "credential", Severity::High),
    (r"private[_-]?key", "private key", Severity::Critical),
];

static_regex! {
    fn aws_access_key() = r"^AKIA[0-9A-Z]{16}$";
}
static_regex! {
    fn github_token() = r"^gh[pousr]_[a-zA-Z0-9_]{36,}$";
}
static_regex! {
    fn credential_shape() = r"^[a-zA-Z0-9_\-/+]+$";
}
static_regex! {
    fn credential_name() = r"key|secret|token|auth";
}
static_regex! {
    fn dynamic_secret_name() = r"api[_-]?key|password|secret|token|auth|credential";
}
static_regex! {
    fn block_comment() = r"/\*.*\*/";
}

struct LinePattern {
    regex: &'static str,
    message: &'static str,
    remediation: &'static str,
    placeholder_exempt: bool,
}

const LINE_PATTERNS: &[LinePattern] = &[
    LinePattern {
        regex: r"-----BEGIN\s+(RSA\s+|EC\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
        message: "Private key detected",
        remediation: "Remove private keys from source code. Use environment variables or a secrets manager.",
        placeholder_exempt: false,
    },
    LinePattern {
        regex: r"AKIA[0-9A-Z]{16}",
        message: "AWS credential pattern detected",
        remediation: "Use AWS credential files or environment variables. Never hardcode AWS credentials.",
        placeholder_exempt: true,
    },
    LinePattern {
        regex: r#"(?i)['"][0-9a-zA-Z/+]{40}['"]\s*.*\s*(aws|amazon)"#,
        message: "AWS credential pattern detected",
        remediation: "Use AWS credential files or environment variables. Never hardcode AWS credentials.",
        placeholder_exempt: true,
    },
    LinePattern {
        regex: r"gh[pousr]_[a-zA-Z0-9_]{36,}",
        message: "GitHub token pattern detected",
        remediation: "Use environment variables or GitHub CLI for authentication. Never hardcode tokens.",
        placeholder_exempt: true,
    },
    LinePattern {
        regex: r#"(?i)github[_-]?token\s*[:=]\s*['"][a-f0-9]{40}['"]"#,
        message: "GitHub token pattern detected",
        remediation: "Use environment variables or GitHub CLI for authentication. Never hardcode tokens.",
        placeholder_exempt: true,
    },
];

fn name_classes() -> &'static [(Regex, &'static str, Severity)] {
    static CELL: OnceLock<Vec<(Regex, &'static str, Severity)>> = OnceLock::new();
    CELL.get_or_init(|| {
        NAME_CLASSES
            .iter()
            .filter_map(|(pattern, label, severity)| {
                compile_builtin(pattern).map(|re| (re, *label, *severity))
            })
            .collect()
    })
}

fn line_patterns() -> &'static [(Regex, &'static LinePattern)] {
    static CELL: OnceLock<Vec<(Regex, &'static LinePattern)>> = OnceLock::new();
    CELL.get_or_init(|| {
        LINE_PATTERNS
            .iter()
            .filter_map(|p| compile_builtin(p.regex).map(|re| (re, p)))
            .collect()
    })
}

fn is_match(re: Option<&Regex>, s: &str) -> bool {
    re.map_or(false, |re| re.is_match(s))
}

/// Credentials assigned as literals, plus raw-text key and token shapes.
pub struct HardcodedSecretsCheck;

#[async_trait]
impl Check for HardcodedSecretsCheck {
    fn name(&self) -> &'static str {
        "hardcoded-secret"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        ctx.add_findings(analyze(ctx.unit()));
        Ok(())
    }
}

fn analyze(unit: &SourceUnit) -> Vec<FindingDraft> {
    let mut drafts = Vec::new();
    if let Some(tree) = unit.tree.as_ref() {
        let (assigned, handled) = assignment_findings(tree, unit);
        drafts.extend(assigned);
        drafts.extend(vendor_literal_findings(tree, unit, &handled));
    }
    drafts.extend(line_findings(&unit.lines));
    drafts
}

/// (name, value node) pairs from declarators, object pairs and assignments.
/// Also returns the ids of the string nodes it judged.
fn assignment_findings(tree: &Tree, unit: &SourceUnit) -> (Vec<FindingDraft>, HashSet<usize>) {
    let source = unit.text.as_str();
    let mut drafts = Vec::new();
    let mut handled = HashSet::new();

    let kinds = ["variable_declarator", "pair", "assignment_expression"];
    for node in nodes_of_kind(tree.root_node(), &kinds) {
        let (target_field, value_field) = match node.kind() {
            "variable_declarator" => ("name", "value"),
            "pair" => ("key", "value"),
            _ => ("left", "right"),
        };
        let target = node.child_by_field_name(target_field);
        let value = node.child_by_field_name(value_field);
        let (Some(target), Some(value)) = (target, value) else {
            continue;
        };
        let Some(name) = target_name(node.kind(), target, source) else {
            continue;
        };

        if let Some(literal) = string_value(&value, source) {
            handled.insert(value.id());
            drafts.extend(check_literal(&name, &literal, value, unit));
        } else if value.kind() == "template_string"
            && node.kind() == "variable_declarator"
            && is_match(dynamic_secret_name(), &name.to_lowercase())
        {
            drafts.push(draft(value, unit, Severity::Low, TEMPLATE_SECRET.to_string()));
        }
    }
    (drafts, handled)
}

/// Vendor-shaped keys in any other string literal, e.g. call arguments.
fn vendor_literal_findings(
    tree: &Tree,
    unit: &SourceUnit,
    handled: &HashSet<usize>,
) -> Vec<FindingDraft> {
    let source = unit.text.as_str();
    nodes_of_kind(tree.root_node(), &["string"])
        .into_iter()
        .filter(|node| !handled.contains(&node.id()))
        .filter_map(|node| {
            let literal = string_value(&node, source)?;
            if is_placeholder_value(&literal) {
                return None;
            }
            let label = vendor_label(&literal)?;
            Some(draft(
                node,
                unit,
                Severity::Critical,
                format!("Hardcoded {} detected in string literal", label),
            ))
        })
        .collect()
}

fn vendor_label(value: &str) -> Option<&'static str> {
    if is_match(aws_access_key(), value) {
        Some("AWS access key")
    } else if is_match(github_token(), value) {
        Some("GitHub token")
    } else {
        None
    }
}

fn target_name(parent_kind: &str, target: Node, source: &str) -> Option<String> {
    match (parent_kind, target.kind()) {
        ("variable_declarator", "identifier") => Some(node_text(&target, source).to_string()),
        ("pair", "property_identifier" | "identifier") => {
            Some(node_text(&target, source).to_string())
        }
        ("pair", "string") => string_value(&target, source),
        ("assignment_expression", "identifier") => {
            Some(node_text(&target, source).to_string())
        }
        ("assignment_expression", "member_expression") => {
            let property = target.child_by_field_name("property")?;
            (property.kind() == "property_identifier")
                .then(|| node_text(&property, source).to_string())
        }
        _ => None,
    }
}

fn check_literal(name: &str, value: &str, node: Node, unit: &SourceUnit) -> Option<FindingDraft> {
    if value.is_empty() || is_placeholder_value(value) {
        return None;
    }

    let start = node.start_byte();
    let from = floor_char_boundary(&unit.text, start.saturating_sub(ENV_LOOKBEHIND));
    let window = unit.text.get(from..start).unwrap_or("");
    if ENV_ACCESSORS.iter().any(|accessor| window.contains(accessor)) {
        return None;
    }

    let hardcoded = |label: &str| format!("Hardcoded {} detected: \"{}\"", label, name);

    if let Some(label) = vendor_label(value) {
        return Some(draft(node, unit, Severity::Critical, hardcoded(label)));
    }

    let lower_name = name.to_lowercase();
    let class = name_classes()
        .iter()
        .find(|(re, _, _)| re.is_match(&lower_name));
    if let Some((_, label, severity)) = class {
        return Some(draft(node, unit, *severity, hardcoded(label)));
    }

    if value.len() >= 16
        && is_match(credential_shape(), value)
        && is_match(credential_name(), &lower_name)
    {
        return Some(draft(node, unit, Severity::Medium, hardcoded("potential credential")));
    }
    None
}

fn draft(node: Node, unit: &SourceUnit, severity: Severity, message: String) -> FindingDraft {
    FindingDraft::new(FindingKind::HardcodedSecret, severity, message)
        .at(get_position(&node))
        .with_code(extract_slice(&Span::of(&node), &unit.lines))
        .with_remediation(REMEDIATION)
}

/// Byte offset of a `//` comment: at line start or after whitespace, so `https://` stays.
fn line_comment_start(line: &str) -> Option<usize> {
    line.match_indices("//").map(|(i, _)| i).find(|&i| {
        line[..i]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace)
    })
}

/// Per-line raw-text scan with `//` and `/* */` comments removed.
fn line_findings(lines: &[String]) -> Vec<FindingDraft> {
    let mut drafts = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let without_line_comment =
            line_comment_start(line).map_or(line.as_str(), |i| &line[..i]);
        let code_only = match block_comment() {
            Some(re) => re.replacen(without_line_comment, 1, "").into_owned(),
            None => without_line_comment.to_string(),
        };

        for (re, pattern) in line_patterns() {
            let Some(m) = re.find(&code_only) else {
                continue;
            };
            if pattern.placeholder_exempt && is_placeholder_value(m.as_str()) {
                continue;
            }
            let column = line.find(m.as_str()).map_or(1, |i| i + 1);
            drafts.push(
                FindingDraft::new(
                    FindingKind::HardcodedSecret,
                    Severity::Critical,
                    pattern.message,
                )
                    .at(Position::new(index + 1, column))
                    .with_code(m.as_str())
                    .with_remediation(pattern.remediation),
            );
        }
    }
    drafts
}
