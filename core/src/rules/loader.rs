use crate::rules::model::{CustomRule, RuleSet};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Load custom rules from a rule file or a directory of rule files.
/// Missing or malformed sources yield an empty set.
pub fn load_rules<P: AsRef<Path>>(path: P) -> Vec<CustomRule> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No custom rules at {:?}", path);
        return Vec::new();
    }

    match try_load_rules(path) {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Could not load custom rules from {:?}: {:#}", path, e);
            Vec::new()
        }
    }
}

pub fn try_load_rules(path: &Path) -> Result<Vec<CustomRule>> {
    if path.is_file() {
        return load_rule_file(path);
    }

    let mut rules = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || rule_format(entry.path()).is_none() {
            continue;
        }
        match load_rule_file(entry.path()) {
            Ok(mut loaded) => rules.append(&mut loaded),
            Err(e) => warn!("Skipping rule file {:?}: {:#}", entry.path(), e),
        }
    }
    Ok(rules)
}

#[derive(Clone, Copy)]
enum RuleFormat {
    Json,
    Yaml,
}

fn rule_format(path: &Path) -> Option<RuleFormat> {
    match path.extension()?.to_str()? {
        "json" => Some(RuleFormat::Json),
        "yaml" | "yml" => Some(RuleFormat::Yaml),
        _ => None,
    }
}

fn load_rule_file(path: &Path) -> Result<Vec<CustomRule>> {
    let format = rule_format(path)
        .with_context(|| format!("Unsupported rule file extension: {:?}", path))?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file: {:?}", path))?;

    // RuleSet first, then a single rule
    if let Ok(rule_set) = parse::<RuleSet>(format, &content) {
        return Ok(rule_set.rules);
    }
    let rule = parse::<CustomRule>(format, &content)
        .with_context(|| format!("Failed to parse rule file: {:?}", path))?;
    Ok(vec![rule])
}

fn parse<T: DeserializeOwned>(format: RuleFormat, content: &str) -> Result<T> {
    Ok(match format {
        RuleFormat::Json => serde_json::from_str(content)?,
        RuleFormat::Yaml => serde_yaml::from_str(content)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Severity;

    const RULES_JSON: &str = r#"{
        "rules": [
            {
                "id": "NO-WEBHOOK",
                "name": "Discord webhook",
                "description": "Data sent to a webhook",
                "severity": "high",
                "patterns": ["discord\\.com/api/webhooks"],
                "remediation": "Remove the webhook",
                "owaspId": "LLM02"
            }
        ]
    }"#;

    #[test]
    fn loads_rule_set_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, RULES_JSON).unwrap();

        let rules = load_rules(&path);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].severity, Severity::High);
        assert_eq!(rules[0].owasp_id.as_deref(), Some("LLM02"));
    }

    #[test]
    fn loads_directory_of_single_rules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("one.yaml"),
            "id: R1\nname: Rule one\nseverity: low\npatterns: ['foo']\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.yml"), "id: [").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rules = load_rules(dir.path());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "R1");
        assert!(rules[0].remediation.is_empty());
    }

    #[test]
    fn missing_or_malformed_source_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rules(dir.path().join("absent.json")).is_empty());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ nope").unwrap();
        assert!(load_rules(&bad).is_empty());
    }
}
