use crate::ast::query::{call_arguments, nodes_of_kind, resolve_callee, Callee};
use crate::ast::{extract_slice, get_position, Span};
use crate::config::ScanOptions;
use crate::scanner::{
    contextual_severity, Check, CheckContext, FindingDraft, FindingKind, SourceUnit,
};
use async_trait::async_trait;
use tree_sitter::Node;

const VM_FUNCTIONS: &[&str] = &[
    "runInContext",
    "runInNewContext",
    "runInThisContext",
    "compileFunction",
];

const REMEDIATION: &str = "Avoid dynamic code execution. Use safer alternatives like JSON.parse for data, or properly sandbox any necessary dynamic code.";

/// `eval`, `new Function`, string timers and `vm` execution.
pub struct CodeInjectionCheck;

#[async_trait]
impl Check for CodeInjectionCheck {
    fn name(&self) -> &'static str {
        "code-injection"
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
    let source = unit.text.as_str();
    let mut drafts = Vec::new();

    for node in nodes_of_kind(tree.root_node(), &["call_expression", "new_expression"]) {
        let callee = resolve_callee(node, source);

        if node.kind() == "new_expression" {
            if callee == Callee::Identifier("Function") {
                let args = call_arguments(node);
                if !args.is_empty() {
                    let dynamic = args.iter().any(|arg| arg.kind() != "string");
                    let extra = if dynamic { "with dynamic arguments" } else { "" };
                    drafts.push(report(node, "new Function()", extra, unit));
                }
            }
            continue;
        }

        match callee {
            Callee::Identifier("eval") => drafts.push(report(node, "eval", "", unit)),
            Callee::Identifier(name @ ("setTimeout" | "setInterval")) => {
                let string_arg = call_arguments(node)
                    .first()
                    .map_or(false, |arg| arg.kind() == "string");
                if string_arg {
                    drafts.push(report(node, &format!("{} with string", name), "", unit));
                }
            }
            Callee::Member { property, .. } if VM_FUNCTIONS.contains(&property) => {
                drafts.push(report(node, &format!("vm.{}", property), "", unit));
            }
            _ => {}
        }
    }
    drafts
}

fn report(node: Node, context: &str, extra: &str, unit: &SourceUnit) -> FindingDraft {
    let message = if extra.is_empty() {
        format!("Code injection risk: {}", context)
    } else {
        format!("Code injection risk: {} {}", context, extra)
    };
    let severity =
        contextual_severity(FindingKind::CodeInjection, &format!("{}{}", context, extra));

    FindingDraft::new(FindingKind::CodeInjection, severity, message)
        .at(get_position(&node))
        .with_code(extract_slice(&Span::of(&node), &unit.lines))
        .with_remediation(REMEDIATION)
}
