// 修复建议: enrich admitted findings with provider-generated fixes
use crate::config::RetryPolicy;
use crate::providers::{with_retry, AnalysisProvider, ProviderError, RemediationProvider};
use crate::scanner::Finding;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub const PROVIDER_MISSING_FIX: &str =
    "[AI-Generated Fix] AI provider not configured. Attach a remediation provider to the scan engine.";

fn failed_fix(finding: &Finding) -> String {
    format!("[AI-Generated Fix] Error generating fix for {}.", finding.kind)
}

/// Remove markdown code fences so the suggestion is copy-pastable.
pub fn strip_code_fences(text: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```(?:typescript|javascript|python|go|rust)?").ok()
    });
    match fence {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.replace("```", "").trim().to_string(),
    }
}

/// Description handed to the remediation provider for one finding.
pub fn describe_finding(finding: &Finding) -> String {
    format!(
        "Vulnerability Type: {}\nSeverity: {}\nFile: {}\nLine: {}\nMessage: {}",
        finding.kind, finding.severity, finding.file_path, finding.line, finding.message
    )
}

/// Adapts any text-generation backend into a remediation provider.
pub struct PromptRemediation {
    provider: Arc<dyn AnalysisProvider>,
}

impl PromptRemediation {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { provider }
    }

    fn prompt(description: &str, snippet: &str) -> String {
        format!(
            "Analyze the following security finding and return a secure code replacement only.\n\
             Respond with the corrected code snippet only (no explanation, no markdown fences).\n\n\
             {}\n\nVulnerable Code Snippet:\n{}\n\n\
             Provide a secure, minimal, and idiomatic replacement. If multiple lines are required, \
             return valid runnable code for the relevant language.",
            description, snippet
        )
    }
}

#[async_trait]
impl RemediationProvider for PromptRemediation {
    async fn suggest_fix(&self, description: &str, snippet: &str) -> Result<String, ProviderError> {
        let text = self
            .provider
            .generate(&Self::prompt(description, snippet), false)
            .await?;
        Ok(strip_code_fences(&text))
    }
}

/// Replace the remediation text of every finding with a suggested fix.
/// Never fails: provider errors degrade to a placeholder.
pub async fn enrich_findings(
    findings: &mut [Finding],
    provider: Option<&dyn RemediationProvider>,
    retry: &RetryPolicy,
    verbose: bool,
) {
    let Some(provider) = provider else {
        debug!("Auto-remediation requested without a provider");
        for finding in findings.iter_mut() {
            finding.remediation = PROVIDER_MISSING_FIX.to_string();
        }
        return;
    };

    for finding in findings.iter_mut() {
        let description = describe_finding(finding);
        let snippet = finding.code.clone();
        let result = with_retry(retry, "remediation", verbose, || {
            provider.suggest_fix(&description, &snippet)
        })
        .await;

        finding.remediation = match result {
            Ok(fix) => fix,
            Err(e) => {
                if verbose {
                    warn!("Error generating remediation for {}: {}", finding.finding_id, e);
                } else {
                    debug!("Error generating remediation for {}: {}", finding.finding_id, e);
                }
                failed_fix(finding)
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{FindingKind, Severity};

    struct Echo;

    #[async_trait]
    impl AnalysisProvider for Echo {
        async fn generate(&self, _prompt: &str, _json: bool) -> Result<String, ProviderError> {
            Ok("```typescript\nexecFile('ls', [dir]);\n```\n".to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl RemediationProvider for Broken {
        async fn suggest_fix(&self, _d: &str, _s: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Other("boom".into()))
        }
    }

    fn finding() -> Finding {
        Finding {
            finding_id: "f1".into(),
            file_path: "a.ts".into(),
            detector: "command-injection".into(),
            kind: FindingKind::CommandInjection,
            severity: Severity::Critical,
            line: 1,
            column: 1,
            message: "Potential command injection via exec".into(),
            code: "exec(cmd)".into(),
            remediation: "static".into(),
            context: None,
            metadata: None,
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```rust\nfn a() {}\n```"), "fn a() {}");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[tokio::test]
    async fn prompt_adapter_strips_fences() {
        let adapter = PromptRemediation::new(Arc::new(Echo));
        let fix = adapter.suggest_fix("desc", "exec(cmd)").await.unwrap();
        assert_eq!(fix, "execFile('ls', [dir]);");
    }

    #[tokio::test]
    async fn missing_provider_uses_placeholder() {
        let mut findings = vec![finding()];
        enrich_findings(&mut findings, None, &RetryPolicy::default(), false).await;
        assert_eq!(findings[0].remediation, PROVIDER_MISSING_FIX);
    }

    #[tokio::test]
    async fn provider_error_degrades_to_placeholder() {
        let mut findings = vec![finding()];
        enrich_findings(&mut findings, Some(&Broken), &RetryPolicy::default(), false).await;
        assert_eq!(
            findings[0].remediation,
            "[AI-Generated Fix] Error generating fix for command-injection."
        );
    }
}
