use crate::ast::Position;
use crate::config::ScanOptions;
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit};
use async_trait::async_trait;

const SENSITIVE_BINARIES: &[&str] = &[
    "nc", "netcat", "nmap", "tcpdump", "wireshark", "curl", "wget", "fetch", "ssh", "scp", "ftp",
    "telnet", "python", "python3", "perl", "ruby", "lua", "bash", "sh", "zsh", "powershell",
    "pwsh", "cmd", "base64", "openssl", "gpg",
];

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "exfiltrate",
    "leak",
    "steal",
    "hidden",
    "backdoor",
    "bypass",
    "disable firewall",
    "stop antivirus",
    "upload data to",
    "send code to",
];

static_regex! {
    fn shell_block() = r"(?s)```(?:bash|sh|zsh|powershell|pwsh|cmd)\s*(.*?)```";
}

/// Agent skill manifests (`SKILL.md`): sensitive binaries, intent keywords, download-and-run blocks.
pub struct AgentSkillCheck;

#[async_trait]
impl Check for AgentSkillCheck {
    fn name(&self) -> &'static str {
        "agent-skill"
    }

    async fn check(&self, ctx: &mut CheckContext, _options: &ScanOptions) -> anyhow::Result<()> {
        if !ctx.identifier().ends_with("SKILL.md") {
            return Ok(());
        }
        ctx.add_findings(analyze(ctx.unit()));
        Ok(())
    }
}

fn analyze(unit: &SourceUnit) -> Vec<FindingDraft> {
    let mut drafts = binary_findings(&unit.text);
    drafts.extend(keyword_findings(&unit.text));
    drafts.extend(shell_block_findings(&unit.text));
    drafts
}

/// One high finding per quoted sensitive binary, anchored at the frontmatter.
fn binary_findings(text: &str) -> Vec<FindingDraft> {
    let lowered = text.to_lowercase();
    let quoted = |bin: &str| {
        ['"', '\'']
            .iter()
            .flat_map(|open| {
                ['"', '\'']
                    .iter()
                    .map(move |close| format!("{}{}{}", open, bin, close))
            })
            .any(|needle| lowered.contains(&needle))
    };

    SENSITIVE_BINARIES
        .iter()
        .filter(|bin| quoted(bin))
        .map(|bin| {
            FindingDraft::new(
                FindingKind::AgentSkill,
                Severity::High,
                format!("Skill requires a highly sensitive binary: {}", bin),
            )
            .at(Position::new(1, 1))
            .with_code(format!("Required binary: {}", bin))
            .with_remediation(format!(
                "Verify if the skill absolutely requires {}. Dangerous binaries can be used for data exfiltration or lateral movement.",
                bin
            ))
        })
        .collect()
}

fn keyword_findings(text: &str) -> Vec<FindingDraft> {
    let lowered: Vec<String> = text.split('\n').map(str::to_lowercase).collect();
    let mut drafts = Vec::new();

    for keyword in SUSPICIOUS_KEYWORDS {
        let Some(idx) = lowered.iter().position(|line| line.contains(keyword)) else {
            continue;
        };
        let code = text.split('\n').nth(idx).unwrap_or_default().trim();
        drafts.push(
            FindingDraft::new(
                FindingKind::AgentSkill,
                Severity::Critical,
                format!("Suspicious keyword detected: \"{}\"", keyword),
            )
            .at(Position::new(idx + 1, 1))
            .with_code(code)
            .with_remediation(
                "This skill contains terminology often associated with malicious intent. Perform a manual review and semantic analysis.",
            ),
        );
    }
    drafts
}

fn shell_block_findings(text: &str) -> Vec<FindingDraft> {
    let Some(re) = shell_block() else {
        return Vec::new();
    };

    let mut drafts = Vec::new();
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body = body.as_str();
        if !(body.contains("curl") || body.contains("wget") || body.contains("| bash")) {
            continue;
        }

        let first_line = body.split('\n').next().unwrap_or_default();
        drafts.push(
            FindingDraft::new(
                FindingKind::AgentSkill,
                Severity::High,
                "Skill contains potentially dangerous shell commands (external downloads or piping to bash)",
            )
            .at(Position::new(Position::at_offset(text, whole.start()).line, 1))
            .with_code(format!("{} ...", first_line))
            .with_remediation("Avoid skills that download and execute scripts directly from the internet."),
        );
    }
    drafts
}
