use super::{Check, CheckContext};
use crate::checks::{
    AgentSkillCheck, CodeInjectionCheck, CommandInjectionCheck, CustomRulesCheck,
    DependencyAuditCheck, FileSystemCheck, GoSecurityCheck, HardcodedSecretsCheck,
    MalwareScanCheck, McpDefinitionCheck, PythonSecurityCheck, RustSecurityCheck,
    SemanticAnalysisCheck,
};
use crate::config::ScanOptions;
use crate::providers::{AnalysisProvider, HashLookupProvider};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered set of checks run against every unit.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// All built-in checks in their fixed order. Provider-backed checks are
    /// no-ops when their provider is absent.
    pub fn builtin(
        analysis: Option<Arc<dyn AnalysisProvider>>,
        hash_lookup: Option<Arc<dyn HashLookupProvider>>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register_check(CommandInjectionCheck);
        registry.register_check(CodeInjectionCheck);
        registry.register_check(FileSystemCheck);
        registry.register_check(HardcodedSecretsCheck);
        registry.register_check(PythonSecurityCheck::new());
        registry.register_check(GoSecurityCheck::new());
        registry.register_check(RustSecurityCheck::new());
        registry.register_check(AgentSkillCheck);
        registry.register_check(McpDefinitionCheck);
        registry.register_check(DependencyAuditCheck);
        registry.register_check(CustomRulesCheck);
        registry.register_check(SemanticAnalysisCheck::new(analysis));
        registry.register_check(MalwareScanCheck::new(hash_lookup));
        registry
    }

    pub fn register_check<C: Check + 'static>(&mut self, check: C) {
        self.checks.push(Arc::new(check));
    }

    pub fn register_shared(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every enabled check against `ctx` in registry order. A check that
    /// errors or panics is logged and its findings are discarded; the
    /// remaining checks still run.
    pub async fn run(&self, ctx: &mut CheckContext, options: &ScanOptions) {
        for check in &self.checks {
            let name = check.name();
            if !options.check_enabled(name) {
                continue;
            }

            ctx.set_current_check(name);
            let admitted = ctx.findings().len();
            let outcome = AssertUnwindSafe(check.check(ctx, options))
                .catch_unwind()
                .await;

            let fault = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            ctx.truncate_findings(admitted);
            if options.verbose {
                warn!("Error in check {} for {}: {}", name, ctx.identifier(), fault);
            } else {
                debug!("Error in check {} for {}: {}", name, ctx.identifier(), fault);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::scanner::{FindingDraft, FindingKind, Severity, SourceUnit};
    use async_trait::async_trait;

    struct Failing;
    struct Panicking;
    struct Reporting;
    struct HalfDone;

    #[async_trait]
    impl Check for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn check(&self, _ctx: &mut CheckContext, _o: &ScanOptions) -> anyhow::Result<()> {
            anyhow::bail!("broken check")
        }
    }

    #[async_trait]
    impl Check for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        async fn check(&self, _ctx: &mut CheckContext, _o: &ScanOptions) -> anyhow::Result<()> {
            panic!("boom")
        }
    }

    #[async_trait]
    impl Check for Reporting {
        fn name(&self) -> &'static str {
            "reporting"
        }
        async fn check(&self, ctx: &mut CheckContext, _o: &ScanOptions) -> anyhow::Result<()> {
            ctx.add_finding(
                FindingDraft::new(FindingKind::CustomRule, Severity::Medium, "seen")
                    .at(Position::new(1, 1)),
            );
            Ok(())
        }
    }

    #[async_trait]
    impl Check for HalfDone {
        fn name(&self) -> &'static str {
            "half-done"
        }
        async fn check(&self, ctx: &mut CheckContext, _o: &ScanOptions) -> anyhow::Result<()> {
            ctx.add_finding(
                FindingDraft::new(FindingKind::CustomRule, Severity::High, "partial")
                    .at(Position::new(1, 1)),
            );
            anyhow::bail!("failed after reporting")
        }
    }

    #[tokio::test]
    async fn failed_check_contributes_no_findings() {
        let mut registry = CheckRegistry::new();
        registry.register_check(Reporting);
        registry.register_check(HalfDone);

        let mut ctx = CheckContext::new(SourceUnit::inline("x"), None);
        registry.run(&mut ctx, &ScanOptions::default()).await;

        let detectors: Vec<_> = ctx.findings().iter().map(|f| f.detector.as_str()).collect();
        assert_eq!(detectors, vec!["reporting"]);
    }

    #[tokio::test]
    async fn faults_do_not_stop_later_checks() {
        let mut registry = CheckRegistry::new();
        registry.register_check(Failing);
        registry.register_check(Panicking);
        registry.register_check(Reporting);

        let mut ctx = CheckContext::new(SourceUnit::inline("x"), None);
        registry.run(&mut ctx, &ScanOptions::default()).await;

        assert_eq!(ctx.findings().len(), 1);
        assert_eq!(ctx.findings()[0].detector, "reporting");
    }

    #[tokio::test]
    async fn only_selected_checks_run() {
        let mut registry = CheckRegistry::new();
        registry.register_check(Reporting);

        let options = ScanOptions::default().with_checks(["code-injection"]);
        let mut ctx = CheckContext::new(SourceUnit::inline("x"), None);
        registry.run(&mut ctx, &options).await;
        assert!(ctx.findings().is_empty());
    }

    #[test]
    fn builtin_order_is_fixed() {
        let names = CheckRegistry::builtin(None, None).names();
        assert_eq!(names.len(), 13);
        assert_eq!(
            &names[..4],
            &["command-injection", "code-injection", "file-system", "hardcoded-secret"]
        );
        assert_eq!(names.last(), Some(&"malware-scan"));
    }
}
