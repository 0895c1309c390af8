use super::truncate_chars;
use crate::ast::Position;
use crate::config::ScanOptions;
use crate::rules::model::CustomRule;
use crate::scanner::regex_scanner::{case_insensitive, line_of_offset};
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// User rules from `ScanOptions::custom_rules`.
pub struct CustomRulesCheck;

#[async_trait]
impl Check for CustomRulesCheck {
    fn name(&self) -> &'static str {
        "custom-rules"
    }

    async fn check(&self, ctx: &mut CheckContext, options: &ScanOptions) -> anyhow::Result<()> {
        for rule in &options.custom_rules {
            let drafts = apply_rule(rule, ctx.text());
            ctx.add_findings(drafts);
        }
        Ok(())
    }
}

fn apply_rule(rule: &CustomRule, text: &str) -> Vec<FindingDraft> {
    let mut drafts = Vec::new();
    for pattern in &rule.patterns {
        let regex = match case_insensitive(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!("Custom rule {}: skipping invalid pattern {:?}: {}", rule.id, pattern, e);
                continue;
            }
        };

        for m in regex.find_iter(text) {
            let mut draft = FindingDraft::new(
                FindingKind::CustomRule,
                rule.severity,
                format!("[Custom Rule: {}] {}", rule.id, rule.name),
            )
            .at(Position::new(line_of_offset(text, m.start()), 1))
            .with_code(truncate_chars(m.as_str(), 100))
            .with_remediation(rule.remediation.clone())
            .with_metadata("ruleId", rule.id.clone());
            if let Some(owasp_id) = &rule.owasp_id {
                draft = draft.with_metadata("owaspId", owasp_id.clone());
            }
            drafts.push(draft.with_metadata("customRule", Value::Bool(true)));
        }
    }
    drafts
}
