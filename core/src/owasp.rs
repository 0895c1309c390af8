//! OWASP Top 10 for LLM Applications (2025) catalog and finding mapping.

use crate::scanner::FindingKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OwaspInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub link: &'static str,
}

const OWASP_LINK: &str = "https://owasp.org/www-project-top-10-for-large-language-model-applications/";

pub const OWASP_LLM_TOP_10: [OwaspInfo; 10] = [
    OwaspInfo {
        id: "LLM01",
        name: "Prompt Injection",
        description: "Manipulating LLMs via crafted inputs to override instructions or safety measures.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM02",
        name: "Sensitive Information Disclosure",
        description: "LLMs revealing sensitive data like PII, credentials, or proprietary information.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM03",
        name: "Supply Chain Vulnerabilities",
        description: "Risks from third-party datasets, pre-trained models, and plugins.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM04",
        name: "Data and Model Poisoning",
        description: "Tampering with training data to compromise security or behavior.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM05",
        name: "Improper Output Handling",
        description: "Insufficient validation of LLM outputs leading to downstream exploits like XSS or command injection.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM06",
        name: "Excessive Agency",
        description: "LLMs taking actions without sufficient human oversight or having too many permissions.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM07",
        name: "System Prompt Leakage",
        description: "Disclosure of the LLM's internal system instructions or configuration.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM08",
        name: "Vector and Embedding Weaknesses",
        description: "Vulnerabilities in how LLMs generate, store, or retrieve vectors and embeddings.",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM09",
        name: "Misinformation",
        description: "LLMs producing false or misleading information (hallucinations).",
        link: OWASP_LINK,
    },
    OwaspInfo {
        id: "LLM10",
        name: "Unbounded Consumption",
        description: "LLMs being manipulated to process excessive resources, leading to denial-of-service.",
        link: OWASP_LINK,
    },
];

pub fn owasp_info(id: &str) -> Option<&'static OwaspInfo> {
    OWASP_LLM_TOP_10.iter().find(|info| info.id == id)
}

/// Map a finding to OWASP LLM ids. Falls back to LLM06 (Excessive Agency).
pub fn map_to_owasp(kind: FindingKind, message: &str) -> Vec<&'static str> {
    let mut ids = Vec::new();
    match kind {
        FindingKind::CommandInjection | FindingKind::CodeInjection => {
            ids.push("LLM05");
            ids.push("LLM06");
        }
        FindingKind::HardcodedSecret => ids.push("LLM02"),
        FindingKind::DependencyAudit | FindingKind::MalwareScan => ids.push("LLM03"),
        FindingKind::SemanticAnalysis => {
            let message = message.to_lowercase();
            let mentions = |words: &[&str]| words.iter().any(|w| message.contains(w));
            if mentions(&["prompt injection", "jailbreak", "ignore previous"]) {
                ids.push("LLM01");
            }
            if mentions(&["exfiltration", "credential", "secret"]) {
                ids.push("LLM02");
            }
            if mentions(&["backdoor", "persistence", "shell"]) {
                ids.push("LLM06");
            }
        }
        _ => ids.push("LLM06"),
    }

    if ids.is_empty() {
        ids.push("LLM06");
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_mappings() {
        assert_eq!(map_to_owasp(FindingKind::CodeInjection, ""), vec!["LLM05", "LLM06"]);
        assert_eq!(map_to_owasp(FindingKind::HardcodedSecret, ""), vec!["LLM02"]);
        assert_eq!(map_to_owasp(FindingKind::ToolSchema, ""), vec!["LLM06"]);
    }

    #[test]
    fn semantic_findings_map_by_message() {
        let ids = map_to_owasp(
            FindingKind::SemanticAnalysis,
            "[AI Analysis] Jailbreak attempt with credential exfiltration",
        );
        assert_eq!(ids, vec!["LLM01", "LLM02"]);
        assert_eq!(map_to_owasp(FindingKind::SemanticAnalysis, "odd"), vec!["LLM06"]);
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(owasp_info("LLM03").map(|i| i.name), Some("Supply Chain Vulnerabilities"));
        assert!(owasp_info("LLM11").is_none());
    }
}
