use super::truncate_chars;
use crate::ast::Position;
use crate::config::ScanOptions;
use crate::scanner::{Check, CheckContext, FindingDraft, FindingKind, Severity, SourceUnit};
use async_trait::async_trait;
use serde_json::Value;

const PERMISSIVE_FLAGS: &[&str] = &[
    "allow_all_scopes",
    "agent_scope: *",
    "unrestricted",
    "allow_elevation",
];

static_regex! {
    fn fenced_json() = r"(?s)```json\s*(.*?)```";
}

static_regex! {
    fn inline_json() = r#"(?s)\{\s*".*?\}\s*"#;
}

static_regex! {
    fn privileged_schema() = r"(?i)write|delete|execute|filesystem|fs|network|http://";
}

static_regex! {
    fn executable_definition() = r"(?i)eval\(|new Function|spawn\(|exec\(|system\(|cmd\.|powershell";
}

static_regex! {
    fn url_pattern() = r#"(?i)https?://[^\s",\]}]*"#;
}

static_regex! {
    fn url_host() = r"(?i)^https?://([^/:?#\s]+)";
}

/// MCP manifests embedded in a unit: privileged tool schemas, remote code, permissive flags.
pub struct McpDefinitionCheck;

#[async_trait]
impl Check for McpDefinitionCheck {
    fn name(&self) -> &'static str {
        "mcp-definition"
    }

    async fn check(&self, ctx: &mut CheckContext, options: &ScanOptions) -> anyhow::Result<()> {
        ctx.add_findings(analyze(ctx.unit(), &options.trusted_hosts));
        Ok(())
    }
}

/// A candidate manifest fragment and its byte offset in the unit.
struct Blob<'a> {
    text: &'a str,
    offset: usize,
}

fn parse_manifest(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| serde_yaml::from_str::<Value>(text).ok())
        .filter(|value| !value.is_null())
}

fn find_blobs(text: &str) -> Vec<Blob<'_>> {
    let mut blobs = Vec::new();

    let trimmed = text.trim();
    let mut whole = None;
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && parse_manifest(trimmed).is_some()
    {
        let offset = text.len() - text.trim_start().len();
        blobs.push(Blob { text: trimmed, offset });
        whole = Some(trimmed);
    }

    if let Some(re) = fenced_json() {
        for caps in re.captures_iter(text) {
            if let Some(body) = caps.get(1) {
                blobs.push(Blob {
                    text: body.as_str(),
                    offset: body.start(),
                });
            }
        }
    }

    if let Some(re) = inline_json() {
        for m in re.find_iter(text) {
            if whole == Some(m.as_str().trim()) {
                continue;
            }
            blobs.push(Blob {
                text: m.as_str(),
                offset: m.start(),
            });
        }
    }
    blobs
}

fn is_trusted(url: &str, trusted_hosts: &[String]) -> bool {
    let Some(host) = url_host()
        .and_then(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
    else {
        return false;
    };
    trusted_hosts.iter().any(|trusted| {
        let trusted = trusted.to_ascii_lowercase();
        host == trusted || host.ends_with(&format!(".{}", trusted))
    })
}

fn has_untrusted_url(text: &str, trusted_hosts: &[String]) -> bool {
    url_pattern().map_or(false, |re| {
        re.find_iter(text)
            .any(|m| !is_trusted(m.as_str(), trusted_hosts))
    })
}

fn suggestion(kind: &str, detail: &str) -> Vec<String> {
    let text = match kind {
        "global-flag" => format!(
            "Remove the global permissive flag '{}' or set it to false and enumerate explicit scopes.",
            detail
        ),
        "tool-url" => format!(
            "Replace remote URL '{}' with a vetted local implementation or a trusted host and verify integrity (checksum/signature).",
            detail
        ),
        "tool-schema" => "Restrict schema actions: remove 'filesystem'/'execute' capabilities from the tool schema or require explicit scoped permissions.".to_string(),
        _ => format!(
            "Remove executable code from definition '{}' or move it to a sandboxed, reviewed runtime.",
            detail
        ),
    };
    vec![text]
}

fn analyze(unit: &SourceUnit, trusted_hosts: &[String]) -> Vec<FindingDraft> {
    let text = unit.text.as_str();
    let mut drafts = Vec::new();

    for blob in find_blobs(text) {
        let Some(manifest) = parse_manifest(blob.text) else {
            continue;
        };
        let base = Position::new(Position::at_offset(text, blob.offset).line, 1);
        // blob 内子串的精确位置，找不到时退回 blob 起始行
        let locate = |needle: &str| {
            blob.text
                .find(needle)
                .map_or(base, |idx| Position::at_offset(text, blob.offset + idx))
        };

        if let Some(tools) = manifest.get("tools").and_then(Value::as_array) {
            for (idx, tool) in tools.iter().enumerate() {
                let name = tool
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let label = name.clone().unwrap_or_else(|| idx.to_string());
                let tool_id = name.unwrap_or_else(|| format!("tool[{}]", idx));

                if let Some(schema) = tool.get("schema").filter(|s| !s.is_null()) {
                    let rendered = schema.to_string();
                    if privileged_schema().map_or(false, |re| re.is_match(&rendered)) {
                        drafts.push(
                            FindingDraft::new(
                                FindingKind::ToolSchema,
                                Severity::High,
                                format!("Tool schema allows privileged actions for tool: {}", label),
                            )
                            .at(locate("schema"))
                            .with_code(truncate_chars(&rendered, 200))
                            .with_remediation("Review tool schema and restrict capabilities. Avoid allowing direct filesystem/network/exec access in tool schemas.")
                            .with_metadata("tool", tool_id.clone())
                            .with_metadata("suggestions", suggestion("tool-schema", &label)),
                        );
                    }
                }

                if let Some(url) = tool.get("url").and_then(Value::as_str) {
                    if has_untrusted_url(url, trusted_hosts) {
                        drafts.push(
                            FindingDraft::new(
                                FindingKind::ToolSchema,
                                Severity::Medium,
                                format!("Tool references remote URL: {}", url),
                            )
                            .at(locate(url))
                            .with_code(format!("url: {}", url))
                            .with_remediation("Avoid loading tool behavior from untrusted remote URLs. Prefer local vetted implementations.")
                            .with_metadata("tool", tool_id.clone())
                            .with_metadata("suggestions", suggestion("tool-url", url)),
                        );
                    }
                }
            }
        }

        if let Some(definitions) = manifest.get("definitions").and_then(Value::as_object) {
            for (key, definition) in definitions {
                let rendered = definition.to_string();

                if executable_definition().map_or(false, |re| re.is_match(&rendered)) {
                    drafts.push(
                        FindingDraft::new(
                            FindingKind::ExcessiveAgency,
                            Severity::Critical,
                            format!(
                                "Definition {} contains executable behavior or code that may grant excessive agency",
                                key
                            ),
                        )
                        .at(locate(key))
                        .with_code(truncate_chars(&rendered, 200))
                        .with_remediation("Remove executable semantics from MCP definitions or gate them behind strict sandboxing and manual review.")
                        .with_metadata("definition", key.clone())
                        .with_metadata("suggestions", suggestion("definition-exec", key)),
                    );
                }

                if has_untrusted_url(&rendered, trusted_hosts) {
                    let first_url = url_pattern()
                        .and_then(|re| re.find(blob.text))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    let position = if first_url.is_empty() { base } else { locate(first_url) };
                    drafts.push(
                        FindingDraft::new(
                            FindingKind::McpDefinition,
                            Severity::High,
                            format!("Definition {} references external resources (URLs)", key),
                        )
                        .at(position)
                        .with_code(truncate_chars(&rendered, 200))
                        .with_remediation("Host required resources locally or ensure remote endpoints are trusted and integrity-verified.")
                        .with_metadata("definition", key.clone())
                        .with_metadata("suggestions", suggestion("tool-url", first_url)),
                    );
                }
            }
        }

        for flag in PERMISSIVE_FLAGS {
            let declared = manifest
                .as_object()
                .map_or(false, |object| object.contains_key(*flag));
            if blob.text.contains(flag) || declared {
                drafts.push(
                    FindingDraft::new(
                        FindingKind::ExcessiveAgency,
                        Severity::Critical,
                        format!("MCP manifest contains global permissive flag: {}", flag),
                    )
                    .at(base)
                    .with_code(*flag)
                    .with_remediation("Remove global permissive flags. Use least privilege and explicit scopes for agent actions.")
                    .with_metadata("suggestions", suggestion("global-flag", flag)),
                );
            }
        }
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
  "tools": [
    {
      "name": "writer",
      "schema": { "actions": ["write", "read"] },
      "url": "https://tools.example.com/writer.js"
    },
    { "name": "reader", "url": "https://cdn.trusted.dev/reader.js" }
  ],
  "definitions": {
    "runner": { "command": "spawn('sh')" }
  },
  "allow_elevation": true
}"#;

    fn run(text: &str, trusted: &[&str]) -> Vec<FindingDraft> {
        let trusted: Vec<String> = trusted.iter().map(|s| s.to_string()).collect();
        analyze(&SourceUnit::text_only("mcp.json", text), &trusted)
    }

    #[test]
    fn whole_manifest_findings() {
        let drafts = run(MANIFEST, &["trusted.dev"]);
        let summary: Vec<_> = drafts.iter().map(|d| (d.kind, d.severity)).collect();
        assert_eq!(
            summary,
            vec![
                (FindingKind::ToolSchema, Severity::High),
                (FindingKind::ToolSchema, Severity::Medium),
                (FindingKind::ExcessiveAgency, Severity::Critical),
                (FindingKind::ExcessiveAgency, Severity::Critical),
            ]
        );
        assert_eq!(drafts[0].message, "Tool schema allows privileged actions for tool: writer");
        assert_eq!(drafts[0].position, Position::new(5, 8));
        assert_eq!(drafts[1].message, "Tool references remote URL: https://tools.example.com/writer.js");
        assert_eq!(drafts[3].code, "allow_elevation");
        assert_eq!(drafts[3].position, Position::new(1, 1));
    }

    #[test]
    fn untrusted_hosts_are_reported() {
        let drafts = run(MANIFEST, &[]);
        let remote: Vec<_> = drafts
            .iter()
            .filter(|d| d.message.starts_with("Tool references remote URL"))
            .collect();
        assert_eq!(remote.len(), 2);
    }

    #[test]
    fn suggestions_land_in_metadata() {
        let drafts = run(MANIFEST, &["trusted.dev"]);
        let metadata = drafts[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["tool"], "writer");
        assert!(metadata["suggestions"].as_array().map_or(false, |s| s.len() == 1));
    }

    #[test]
    fn fenced_block_in_markdown() {
        let doc = "# Server\n\n```json\n{\"definitions\": {\"docs\": {\"href\": \"https://evil.example/x\"}}}\n```\n";
        let drafts = run(doc, &[]);
        let definition: Vec<_> = drafts
            .iter()
            .filter(|d| d.kind == FindingKind::McpDefinition)
            .collect();
        assert_eq!(definition.len(), 1);
        assert_eq!(definition[0].message, "Definition docs references external resources (URLs)");
        assert_eq!(definition[0].position.line, 4);
    }

    #[test]
    fn ordinary_code_is_clean() {
        assert!(run("const config = { retries: 3 };\nmodule.exports = config;\n", &[]).is_empty());
    }
}
