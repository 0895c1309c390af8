use super::contains_shell_metacharacters;
use crate::ast::parser::floor_char_boundary;
use crate::ast::query::{
    call_arguments, classify_argument, node_text, nodes_of_kind, resolve_callee, ArgumentShape,
};
use crate::ast::{extract_slice, get_position, Position, Span};
use crate::config::ScanOptions;
use crate::scanner::{
    contextual_severity, Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit,
};
use async_trait::async_trait;
use tree_sitter::{Node, Tree};

const EXEC_FUNCTIONS: &[&str] = &["exec", "execSync", "spawn", "execFile"];
const BASH_TOOL_PATTERNS: &[&str] = &["bash", "system.run", "shell"];
const SHELL_INDICATORS: &[&str] = &[
    "exec",
    "spawn",
    "bash",
    "sh",
    "cmd",
    "powershell",
    "system.run",
];

const REMEDIATION: &str = "Use parameterized commands or sanitize input. Avoid passing user input directly to shell commands.";

static_regex! {
    fn template_literal() = r"`([^`]*\$\{[^}]+\}[^`]*)`";
}

/// Process spawning and agent bash-tool calls fed with dynamic input.
pub struct CommandInjectionCheck;

#[async_trait]
impl Check for CommandInjectionCheck {
    fn name(&self) -> &'static str {
        "command-injection"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        ctx.add_findings(analyze(ctx.unit()));
        Ok(())
    }
}

fn analyze(unit: &SourceUnit) -> Vec<FindingDraft> {
    let Some(tree) = unit.tree.as_ref() else {
        return Vec::new();
    };
    let mut drafts = call_findings(tree, unit);
    drafts.extend(template_findings(&unit.text));
    drafts
}

fn call_findings(tree: &Tree, unit: &SourceUnit) -> Vec<FindingDraft> {
    let source = unit.text.as_str();
    let mut drafts = Vec::new();

    for call in nodes_of_kind(tree.root_node(), &["call_expression"]) {
        let Some(name) = resolve_callee(call, source).name() else {
            continue;
        };

        if EXEC_FUNCTIONS.contains(&name) {
            drafts.extend(analyze_call(call, name, unit, false));
        }

        let callee_text = call
            .child_by_field_name("function")
            .map(|f| node_text(&f, source).to_lowercase())
            .unwrap_or_default();
        let lower_name = name.to_lowercase();
        let is_bash_tool = BASH_TOOL_PATTERNS.iter().any(|p| {
            if p.contains('.') {
                callee_text.contains(p)
            } else {
                lower_name.contains(p)
            }
        });
        if is_bash_tool {
            drafts.extend(analyze_call(call, name, unit, true));
        }
    }
    drafts
}

fn analyze_call(
    call: Node,
    name: &str,
    unit: &SourceUnit,
    bash_tool: bool,
) -> Option<FindingDraft> {
    let args = call_arguments(call);
    let first = args.first()?;

    let context = match classify_argument(first, &unit.text) {
        ArgumentShape::Interpolated { segments } => {
            let mut context = format!("{} with template literal", name);
            if segments.iter().any(|s| contains_shell_metacharacters(s)) {
                context.push_str(" with shell metacharacters");
            }
            context
        }
        ArgumentShape::Dynamic => format!("{} with dynamic input", name),
        ArgumentShape::Literal(value) if contains_shell_metacharacters(&value) => {
            format!("{} with shell metacharacters", name)
        }
        ArgumentShape::Literal(_) => return None,
    };

    let message = if bash_tool {
        format!("Potential command injection in bash tool call: {}", name)
    } else {
        format!("Potential command injection via {}", name)
    };

    Some(
        FindingDraft::new(
            FindingKind::CommandInjection,
            contextual_severity(FindingKind::CommandInjection, &context),
            message,
        )
        .at(get_position(&call))
        .with_code(extract_slice(&Span::of(&call), &unit.lines))
        .with_remediation(REMEDIATION),
    )
}

/// Interpolated backtick templates that look like shell commands.
fn template_findings(text: &str) -> Vec<FindingDraft> {
    let Some(re) = template_literal() else {
        return Vec::new();
    };

    let mut drafts = Vec::new();
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !contains_shell_metacharacters(body.as_str()) {
            continue;
        }

        let from = floor_char_boundary(text, whole.start().saturating_sub(100));
        let preceding = text[from..whole.start()].to_lowercase();
        if !SHELL_INDICATORS.iter().any(|ind| preceding.contains(ind)) {
            continue;
        }

        drafts.push(
            FindingDraft::new(
                FindingKind::CommandInjection,
                Severity::High,
                "Template literal with shell metacharacters detected in command context",
            )
            .at(Position::at_offset(text, whole.start()))
            .with_code(whole.as_str())
            .with_remediation("Sanitize template literal expressions before using in shell commands."),
        );
    }
    drafts
}
