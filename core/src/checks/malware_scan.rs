use crate::ast::Position;
use crate::config::ScanOptions;
use crate::providers::{with_retry, HashLookupProvider};
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind, Severity};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// SHA-256 of the unit text checked against a known-malware lookup.
pub struct MalwareScanCheck {
    provider: Option<Arc<dyn HashLookupProvider>>,
}

impl MalwareScanCheck {
    pub fn new(provider: Option<Arc<dyn HashLookupProvider>>) -> Self {
        Self { provider }
    }
}

pub fn content_sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[async_trait]
impl Check for MalwareScanCheck {
    fn name(&self) -> &'static str {
        "malware-scan"
    }

    async fn check(&self, ctx: &mut CheckContext, options: &ScanOptions) -> anyhow::Result<()> {
        let Some(provider) = self.provider.as_ref() else {
            return Ok(());
        };

        let hash = content_sha256(ctx.text());
        let verdict = with_retry(&options.retry, "hash lookup", options.verbose, || {
            provider.lookup(&hash)
        })
        .await;

        let stats = match verdict {
            Ok(Some(stats)) => stats,
            // 未知哈希很常见
            Ok(None) => return Ok(()),
            Err(e) => {
                if options.verbose {
                    warn!("{}: hash lookup failed: {}", ctx.identifier(), e);
                } else {
                    debug!("{}: hash lookup failed: {}", ctx.identifier(), e);
                }
                return Ok(());
            }
        };
        if stats.malicious == 0 {
            return Ok(());
        }

        let mut draft = FindingDraft::new(
            FindingKind::MalwareScan,
            Severity::Critical,
            format!(
                "Known malware: file hash identified as malicious by {} engines",
                stats.malicious
            ),
        )
        .at(Position::new(1, 1))
        .with_code(format!("Hash: {}", hash))
        .with_remediation(
            "This file is a known malware. Immediate deletion and security audit required.",
        )
        .with_metadata("stats", serde_json::to_value(&stats)?);
        if let Some(link) = provider.report_link(&hash) {
            draft = draft.with_metadata("vt_link", link);
        }
        ctx.add_finding(draft);
        Ok(())
    }
}
