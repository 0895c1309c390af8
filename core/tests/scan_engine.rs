use skill_scanner_core::error::CoreError;
use skill_scanner_core::{
    calculate_risk_score, load_rules, FindingKind, Grade, RiskAssessment, ScanEngine, ScanOptions,
    Severity,
};
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

static LOGGING: Once = Once::new();

fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn engine() -> ScanEngine {
    init_logging();
    ScanEngine::new(ScanOptions::default())
}

fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// A small skill repository touching most checks.
fn skill_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "src/handler.js",
        "const { exec } = require('child_process');\nexec(req.query.cmd);\neval(payload);\n",
    );
    write(
        root,
        "src/files.ts",
        "import fs from 'fs';\nfs.readFileSync(\"../../../etc/passwd\");\n",
    );
    write(root, "scripts/tool.py", "import os\nos.system(cmd)\n");
    write(
        root,
        "SKILL.md",
        "---\nname: helper\nrequires: [\"curl\"]\n---\nUse this to exfiltrate logs.\n",
    );
    write(
        root,
        "package.json",
        "{\n  \"name\": \"helper\",\n  \"dependencies\": { \"event-stream\": \"3.3.6\" }\n}\n",
    );
    write(root, "node_modules/pkg/index.js", "eval(x);\n");
    write(root, "src/handler.test.js", "eval(x);\n");
    write(root, "assets/logo.png", [0x89u8, 0x50, 0x4e, 0x47]);
    dir
}

#[tokio::test]
async fn clean_code_has_no_findings() {
    let findings = engine()
        .scan_code("const a = 1;\nfunction add(x, y) { return x + y; }\nmodule.exports = add;\n")
        .await;
    assert!(findings.is_empty(), "{:?}", findings);
}

#[tokio::test]
async fn eval_is_exactly_one_critical_code_injection() {
    let findings = engine().scan_code("eval(x)").await;
    let code_injection: Vec<_> = findings
        .iter()
        .filter(|f| f.kind == FindingKind::CodeInjection)
        .collect();
    assert_eq!(code_injection.len(), 1);
    assert_eq!(code_injection[0].severity, Severity::Critical);
    assert!(code_injection[0].message.contains("eval"));
    assert_eq!(code_injection[0].file_path, "<inline>");
    assert_eq!(code_injection[0].detector, "code-injection");
}

#[tokio::test]
async fn clean_literal_spawn_is_not_command_injection() {
    let findings = engine()
        .scan_code("const { spawn } = require('child_process');\nspawn('ls', ['-la']);\n")
        .await;
    assert!(findings
        .iter()
        .all(|f| f.kind != FindingKind::CommandInjection));
}

#[tokio::test]
async fn vendor_key_is_critical_regardless_of_name() {
    let findings = engine()
        .scan_code("const greeting = \"AKIAIOSFODNN7QWERTY1\";\n")
        .await;
    assert!(findings
        .iter()
        .any(|f| f.kind == FindingKind::HardcodedSecret && f.severity == Severity::Critical));
}

#[tokio::test]
async fn placeholder_secret_is_ignored() {
    let findings = engine().scan_code("const apiKey = \"changeme\";\n").await;
    assert!(findings
        .iter()
        .all(|f| f.kind != FindingKind::HardcodedSecret));
}

#[tokio::test]
async fn traversal_read_is_high_or_critical() {
    let findings = engine()
        .scan_code("fs.readFileSync(\"../../../etc/passwd\")")
        .await;
    assert!(findings
        .iter()
        .any(|f| f.kind == FindingKind::FileSystem && f.severity >= Severity::High));
}

#[tokio::test]
async fn raising_threshold_never_adds_findings() {
    let sample = "exec(userCmd);\nsetTimeout('tick()', 5);\nfs.readFile(p);\nconst token = `${prefix}-abc`;\nconst p2 = '../up';\n";
    let mut previous = usize::MAX;
    for threshold in Severity::ALL {
        let engine = ScanEngine::new(ScanOptions::default().with_threshold(threshold));
        let findings = engine.scan_code(sample).await;
        assert!(findings.len() <= previous);
        assert!(findings.iter().all(|f| f.severity >= threshold));
        previous = findings.len();
    }
}

#[tokio::test]
async fn directory_walk_respects_ignores_and_extensions() {
    let dir = skill_tree();
    let result = engine().scan_directory(dir.path()).await.unwrap();

    assert_eq!(result.summary.total_files, 5);
    assert!(result.skipped.is_empty());
    assert!(result
        .findings
        .iter()
        .all(|f| !f.file_path.contains("node_modules") && !f.file_path.ends_with(".test.js")));

    let kinds: Vec<_> = result.findings.iter().map(|f| f.kind).collect();
    for expected in [
        FindingKind::CommandInjection,
        FindingKind::CodeInjection,
        FindingKind::FileSystem,
        FindingKind::PythonSecurity,
        FindingKind::AgentSkill,
        FindingKind::DependencyAudit,
    ] {
        assert!(kinds.contains(&expected), "missing {}", expected);
    }
    assert_eq!(result.summary.total_findings(), result.findings.len());
}

#[tokio::test]
async fn unreadable_file_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.js", "const a = 1;\n");
    write(dir.path(), "b.py", "print('hi')\n");
    write(dir.path(), "c.ts", [0xffu8, 0xfe, 0x00, 0xc3, 0x28]);

    let result = engine().scan_directory(dir.path()).await.unwrap();
    assert_eq!(result.summary.total_files, 3);
    assert_eq!(result.skipped.len(), 1);
    assert!(result.skipped[0].path.ends_with("c.ts"));

    let concurrent = engine().scan_directory_concurrent(dir.path()).await.unwrap();
    assert_eq!(concurrent.summary.total_files, 3);
    assert_eq!(concurrent.skipped.len(), 1);
}

#[tokio::test]
async fn scan_file_surfaces_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.js");
    assert!(matches!(
        engine().scan_file(&missing).await,
        Err(CoreError::Io(_))
    ));
}

#[tokio::test]
async fn invalid_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "file.js", "const a = 1;\n");

    assert!(matches!(
        engine().scan_directory(dir.path().join("nope")).await,
        Err(CoreError::InvalidTarget(_))
    ));
    assert!(matches!(
        engine().scan_directory(dir.path().join("file.js")).await,
        Err(CoreError::InvalidTarget(_))
    ));
}

#[tokio::test]
async fn concurrent_walk_matches_sequential() {
    let dir = skill_tree();
    let options = ScanOptions {
        max_concurrency: 2,
        ..ScanOptions::default()
    };
    let engine = ScanEngine::new(options);

    let sequential = engine.scan_directory(dir.path()).await.unwrap();
    let concurrent = engine.scan_directory_concurrent(dir.path()).await.unwrap();

    let key = |f: &skill_scanner_core::Finding| {
        (f.file_path.clone(), f.line, f.column, f.message.clone())
    };
    assert_eq!(
        sequential.findings.iter().map(key).collect::<Vec<_>>(),
        concurrent.findings.iter().map(key).collect::<Vec<_>>()
    );
    assert_eq!(sequential.summary, concurrent.summary);
}

#[tokio::test]
async fn check_selection_limits_detectors() {
    let dir = skill_tree();
    let engine = ScanEngine::new(ScanOptions::default().with_checks(["agent-skill"]));
    let result = engine.scan_directory(dir.path()).await.unwrap();
    assert!(!result.findings.is_empty());
    assert!(result.findings.iter().all(|f| f.detector == "agent-skill"));
}

#[tokio::test]
async fn custom_rules_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "rules/webhooks.yaml",
        "name: local\nversion: \"1\"\nrules:\n  - id: CR-100\n    name: Discord webhook\n    severity: high\n    patterns: ['discord(app)?\\.com/api/webhooks']\n    remediation: Remove the webhook\n    owaspId: LLM02\n",
    );
    let rules = load_rules(dir.path().join("rules"));
    assert_eq!(rules.len(), 1);

    let engine = ScanEngine::new(ScanOptions {
        custom_rules: rules,
        ..ScanOptions::default()
    });
    let findings = engine
        .scan_code("const hook = 'https://DISCORD.com/api/webhooks/42';\n")
        .await;
    let custom: Vec<_> = findings
        .iter()
        .filter(|f| f.kind == FindingKind::CustomRule)
        .collect();
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].message, "[Custom Rule: CR-100] Discord webhook");
    assert_eq!(custom[0].metadata.as_ref().unwrap()["owaspId"], "LLM02");
}

#[tokio::test]
async fn mcp_manifest_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "mcp.json",
        r#"{
  "tools": [{ "name": "shell", "schema": { "type": "execute" } }],
  "unrestricted": true
}"#,
    );
    let result = engine().scan_directory(dir.path()).await.unwrap();
    assert!(result
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::ToolSchema && f.severity == Severity::High));
    assert!(result
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::ExcessiveAgency && f.code == "unrestricted"));
}

#[tokio::test]
async fn risk_score_reflects_findings() {
    let dir = skill_tree();
    let result = engine().scan_directory(dir.path()).await.unwrap();
    let risk = RiskAssessment::from_result(&result);
    assert!(risk.score < 50);
    assert!(matches!(risk.grade, Grade::D | Grade::F));
    assert!(!risk.breakdown.is_empty());

    let clean = calculate_risk_score(&[]);
    assert_eq!(clean.score, 100);
    assert_eq!(clean.grade, Grade::A);
}
