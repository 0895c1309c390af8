use super::has_path_traversal;
use crate::ast::query::{
    call_arguments, classify_argument, node_text, nodes_of_kind, resolve_callee, string_value,
    ArgumentShape, Callee,
};
use crate::ast::{extract_slice, get_position, Position, Span};
use crate::config::ScanOptions;
use crate::scanner::{
    contextual_severity, Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit,
};
use async_trait::async_trait;
use tree_sitter::{Node, Tree};

const READ_FUNCTIONS: &[&str] = &["readFile", "readFileSync", "readJson", "readJsonSync"];
const WRITE_FUNCTIONS: &[&str] = &["writeFile", "writeFileSync", "appendFile", "appendFileSync"];
const FS_OBJECTS: &[&str] = &["fs", "fsp", "fsPromises", "fs.promises"];

static_regex! {
    fn quoted_traversal() = r#"['"`]([^'"`]*\.\.[/\\][^'"`]*)['"`]"#;
}

/// Unsafe file access, dynamic module loading and hardcoded traversal paths.
pub struct FileSystemCheck;

#[async_trait]
impl Check for FileSystemCheck {
    fn name(&self) -> &'static str {
        "file-system"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        ctx.add_findings(analyze(ctx.unit()));
        Ok(())
    }
}

fn analyze(unit: &SourceUnit) -> Vec<FindingDraft> {
    let mut drafts = Vec::new();
    if let Some(tree) = unit.tree.as_ref() {
        drafts.extend(fs_call_findings(tree, unit));
        drafts.extend(module_load_findings(tree, unit));
    }
    drafts.extend(traversal_literal_findings(&unit.text));
    drafts
}

/// `fs`, `fsp`, `fsPromises`, `fs.promises` or `require('fs')` receiver.
fn is_fs_receiver(object: Node, source: &str) -> bool {
    match object.kind() {
        "identifier" | "member_expression" => FS_OBJECTS.contains(&node_text(&object, source)),
        "call_expression" => {
            resolve_callee(object, source) == Callee::Identifier("require")
                && call_arguments(object)
                    .first()
                    .and_then(|arg| string_value(arg, source))
                    .map_or(false, |module| module == "fs")
        }
        _ => false,
    }
}

fn fs_call_findings(tree: &Tree, unit: &SourceUnit) -> Vec<FindingDraft> {
    let source = unit.text.as_str();
    let mut drafts = Vec::new();

    for call in nodes_of_kind(tree.root_node(), &["call_expression"]) {
        let Callee::Member { object, property } = resolve_callee(call, source) else {
            continue;
        };
        if !is_fs_receiver(object, source) {
            continue;
        }
        let is_write = WRITE_FUNCTIONS.contains(&property);
        if !is_write && !READ_FUNCTIONS.contains(&property) {
            continue;
        }

        let args = call_arguments(call);
        let Some(first) = args.first() else {
            continue;
        };
        let (dynamic, traversal) = match classify_argument(first, source) {
            ArgumentShape::Interpolated { segments } => {
                (true, segments.iter().any(|s| has_path_traversal(s)))
            }
            ArgumentShape::Dynamic => (true, false),
            ArgumentShape::Literal(path) => (false, has_path_traversal(&path)),
        };
        if !dynamic && !traversal {
            continue;
        }

        let access = if is_write { "write" } else { "read" };
        let (context, detail, remediation) = if traversal {
            (
                format!("{} with path traversal", access),
                "with path traversal",
                "Validate and sanitize file paths. Use path.resolve() with allowlist of allowed directories.",
            )
        } else {
            (
                access.to_string(),
                "with dynamic path",
                "Validate file paths against an allowlist. Avoid passing user input directly to file operations.",
            )
        };

        drafts.push(
            FindingDraft::new(
                FindingKind::FileSystem,
                contextual_severity(FindingKind::FileSystem, &context),
                format!("Unsafe file system operation: {} {}", property, detail),
            )
            .at(get_position(&call))
            .with_code(extract_slice(&Span::of(&call), &unit.lines))
            .with_remediation(remediation),
        );
    }
    drafts
}

/// Dynamic `require(...)`/`import(...)` and `require` of traversal paths.
fn module_load_findings(tree: &Tree, unit: &SourceUnit) -> Vec<FindingDraft> {
    let source = unit.text.as_str();
    let mut drafts = Vec::new();

    for call in nodes_of_kind(tree.root_node(), &["call_expression"]) {
        let callee = resolve_callee(call, source);
        let args = call_arguments(call);
        let Some(arg) = args.first() else {
            continue;
        };

        let issue = match callee {
            Callee::Import if arg.kind() != "string" => Some("dynamic import"),
            Callee::Identifier("require") => {
                if let Some(path) = string_value(arg, source) {
                    has_path_traversal(&path).then_some("require with path traversal")
                } else if matches!(
                    classify_argument(arg, source),
                    ArgumentShape::Interpolated { .. }
                ) {
                    Some("dynamic require with template literal")
                } else {
                    Some("dynamic require")
                }
            }
            _ => None,
        };

        if let Some(issue) = issue {
            drafts.push(
                FindingDraft::new(
                    FindingKind::FileSystem,
                    Severity::High,
                    format!("File system security issue: {}", issue),
                )
                .at(get_position(&call))
                .with_code(extract_slice(&Span::of(&call), &unit.lines))
                .with_remediation("Validate all file paths against an allowlist of allowed locations."),
            );
        }
    }
    drafts
}

/// Quoted strings containing `../` or `..\`, outside comment-looking lines.
fn traversal_literal_findings(text: &str) -> Vec<FindingDraft> {
    let Some(re) = quoted_traversal() else {
        return Vec::new();
    };

    let mut drafts = Vec::new();
    for m in re.find_iter(text) {
        let line_start = text[..m.start()].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &text[line_start..m.start()];
        if prefix.contains("//") || prefix.contains('*') {
            continue;
        }

        drafts.push(
            FindingDraft::new(
                FindingKind::FileSystem,
                Severity::Medium,
                "Path traversal pattern detected in string literal",
            )
            .at(Position::at_offset(text, m.start()))
            .with_code(m.as_str())
            .with_remediation(
                "Validate file paths. Avoid hardcoding relative paths that traverse directories.",
            ),
        );
    }
    drafts
}
