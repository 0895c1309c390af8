// 扫描编排: single units, files and directory walks
use super::manager::CheckRegistry;
use super::{CheckContext, Finding, ScanResult, SkippedEntry, SourceUnit};
use crate::config::ScanOptions;
use crate::error::{CoreError, Result};
use crate::providers::{AnalysisProvider, HashLookupProvider, RemediationProvider};
use crate::remediation::{enrich_findings, PromptRemediation};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".git",
    "*.test.ts",
    "*.test.js",
    "*.spec.ts",
    "*.spec.js",
];

pub const SCANNABLE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts", "md", "json", "yaml", "yml", "py", "go",
    "rs",
];

#[derive(Clone)]
pub struct ScanEngine {
    options: Arc<ScanOptions>,
    registry: CheckRegistry,
    custom_registry: bool,
    remediation: Option<Arc<dyn RemediationProvider>>,
    analysis: Option<Arc<dyn AnalysisProvider>>,
    hash_lookup: Option<Arc<dyn HashLookupProvider>>,
}

impl ScanEngine {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options: Arc::new(options),
            registry: CheckRegistry::builtin(None, None),
            custom_registry: false,
            remediation: None,
            analysis: None,
            hash_lookup: None,
        }
    }

    /// Replace the built-in checks with a caller-assembled registry.
    pub fn with_registry(mut self, registry: CheckRegistry) -> Self {
        self.registry = registry;
        self.custom_registry = true;
        self
    }

    pub fn with_remediation_provider(mut self, provider: Arc<dyn RemediationProvider>) -> Self {
        self.remediation = Some(provider);
        self
    }

    pub fn with_analysis_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.analysis = Some(provider);
        self.rebuild_registry();
        self
    }

    pub fn with_hash_lookup_provider(mut self, provider: Arc<dyn HashLookupProvider>) -> Self {
        self.hash_lookup = Some(provider);
        self.rebuild_registry();
        self
    }

    fn rebuild_registry(&mut self) {
        if !self.custom_registry {
            self.registry = CheckRegistry::builtin(self.analysis.clone(), self.hash_lookup.clone());
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Explicit remediation provider, else one prompting the analysis provider.
    fn remediation_provider(&self) -> Option<Arc<dyn RemediationProvider>> {
        self.remediation.clone().or_else(|| {
            self.analysis
                .clone()
                .map(|p| Arc::new(PromptRemediation::new(p)) as Arc<dyn RemediationProvider>)
        })
    }

    /// Scan a snippet under the `<inline>` identifier.
    pub async fn scan_code(&self, code: &str) -> Vec<Finding> {
        self.scan_unit(SourceUnit::inline(code)).await
    }

    pub async fn scan_unit(&self, unit: SourceUnit) -> Vec<Finding> {
        let mut ctx = CheckContext::new(unit, self.options.severity_threshold);
        self.registry.run(&mut ctx, &self.options).await;

        if self.options.auto_remediate && !ctx.findings().is_empty() {
            let provider = self.remediation_provider();
            enrich_findings(
                ctx.findings_mut(),
                provider.as_deref(),
                &self.options.retry,
                self.options.verbose,
            )
            .await;
        }
        ctx.into_findings()
    }

    pub async fn scan_file(&self, path: impl AsRef<Path>) -> Result<Vec<Finding>> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        Ok(self.scan_unit(SourceUnit::for_path(path, text)).await)
    }

    /// Sequential, deterministic walk of `root`.
    pub async fn scan_directory(&self, root: impl AsRef<Path>) -> Result<ScanResult> {
        let (targets, mut skipped) = self.collect_targets(root.as_ref())?;
        let mut findings = Vec::new();
        let visited = targets.len();

        for path in targets {
            match self.scan_file(&path).await {
                Ok(mut file_findings) => findings.append(&mut file_findings),
                Err(e) => skipped.push(self.skip(&path, &e)),
            }
        }

        Ok(self.finish(root.as_ref(), findings, visited, skipped))
    }

    /// Walk `root` scanning up to `max_concurrency` files at once. Results are
    /// merged in walk order, so output matches `scan_directory`.
    pub async fn scan_directory_concurrent(&self, root: impl AsRef<Path>) -> Result<ScanResult> {
        let (targets, mut skipped) = self.collect_targets(root.as_ref())?;
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut set = JoinSet::new();

        for (index, path) in targets.iter().cloned().enumerate() {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = engine.scan_file(&path).await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<Vec<Finding>>>> =
            targets.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!("Scan task failed: {}", e),
            }
        }

        let mut findings = Vec::new();
        for (path, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Some(Ok(mut file_findings)) => findings.append(&mut file_findings),
                Some(Err(e)) => skipped.push(self.skip(path, &e)),
                None => skipped.push(SkippedEntry {
                    path: path.to_string_lossy().to_string(),
                    reason: "scan task aborted".to_string(),
                }),
            }
        }

        Ok(self.finish(root.as_ref(), findings, targets.len(), skipped))
    }

    /// Eligible files under `root` in walk order, plus entries the walk could not read.
    fn collect_targets(&self, root: &Path) -> Result<(Vec<PathBuf>, Vec<SkippedEntry>)> {
        let meta = std::fs::metadata(root)
            .map_err(|e| CoreError::InvalidTarget(format!("{}: {}", root.display(), e)))?;
        if !meta.is_dir() {
            return Err(CoreError::InvalidTarget(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let matcher = IgnoreMatcher::new(&self.options.effective_ignore_patterns());
        let mut targets = Vec::new();
        let mut skipped = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !matcher.is_ignored(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_scannable(entry.path()) {
                        targets.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_else(|| root.to_string_lossy().to_string());
                    self.log_skip(&path, &e.to_string());
                    skipped.push(SkippedEntry {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok((targets, skipped))
    }

    fn skip(&self, path: &Path, error: &CoreError) -> SkippedEntry {
        let path = path.to_string_lossy().to_string();
        self.log_skip(&path, &error.to_string());
        SkippedEntry {
            path,
            reason: error.to_string(),
        }
    }

    fn log_skip(&self, path: &str, reason: &str) {
        if self.options.verbose {
            warn!("Error scanning {}: {}", path, reason);
        } else {
            debug!("Error scanning {}: {}", path, reason);
        }
    }

    fn finish(
        &self,
        root: &Path,
        findings: Vec<Finding>,
        visited: usize,
        skipped: Vec<SkippedEntry>,
    ) -> ScanResult {
        let result = ScanResult::new(findings, visited, skipped);
        info!(
            "Scanned {} files under {} ({} findings, {} skipped)",
            result.summary.total_files,
            root.display(),
            result.findings.len(),
            result.skipped.len()
        );
        result
    }
}

pub fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCANNABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

enum IgnoreRule {
    Glob(Regex),
    Name(String),
}

/// Entry-name matcher: `*` globs are anchored, other patterns match exactly or as a substring.
pub struct IgnoreMatcher {
    rules: Vec<IgnoreRule>,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let rules = patterns
            .iter()
            .filter_map(|pattern| {
                if pattern.contains('*') {
                    let body = pattern
                        .split('*')
                        .map(regex::escape)
                        .collect::<Vec<_>>()
                        .join(".*");
                    match Regex::new(&format!("^{}$", body)) {
                        Ok(re) => Some(IgnoreRule::Glob(re)),
                        Err(e) => {
                            warn!("Invalid ignore pattern {:?}: {}", pattern, e);
                            None
                        }
                    }
                } else {
                    Some(IgnoreRule::Name(pattern.clone()))
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            IgnoreRule::Glob(re) => re.is_match(name),
            IgnoreRule::Name(pattern) => name == pattern || name.contains(pattern.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> IgnoreMatcher {
        IgnoreMatcher::new(&patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn glob_patterns_are_anchored() {
        let m = matcher(&["*.test.ts"]);
        assert!(m.is_ignored("scanner.test.ts"));
        assert!(!m.is_ignored("scanner.test.tsx"));
        assert!(!m.is_ignored("scannerXtestXts"));
    }

    #[test]
    fn plain_patterns_match_substrings() {
        let m = matcher(&["node_modules", ".git"]);
        assert!(m.is_ignored("node_modules"));
        assert!(m.is_ignored(".github"));
        assert!(!m.is_ignored("src"));
    }

    #[test]
    fn extension_allow_list() {
        assert!(is_scannable(Path::new("a/SKILL.md")));
        assert!(is_scannable(Path::new("main.RS")));
        assert!(!is_scannable(Path::new("image.png")));
        assert!(!is_scannable(Path::new("Makefile")));
    }

    #[tokio::test]
    async fn scan_code_reports_eval() {
        let engine = ScanEngine::new(ScanOptions::default());
        let findings = engine.scan_code("eval(userInput);").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file_path, "<inline>");
    }

    #[tokio::test]
    async fn file_root_is_invalid_target() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let engine = ScanEngine::new(ScanOptions::default());
        assert!(matches!(
            engine.scan_directory(file.path()).await,
            Err(CoreError::InvalidTarget(_))
        ));
    }
}
