// 风险评分
use crate::scanner::{Finding, FindingKind, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: FindingKind,
    pub weight: f64,
    pub count: usize,
    /// Rounded penalty points attributed to this category.
    pub contribution: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub grade: Grade,
    pub level: RiskLevel,
    pub breakdown: Vec<CategoryBreakdown>,
    pub recommendation: String,
}

impl RiskAssessment {
    pub fn from_result(result: &ScanResult) -> Self {
        calculate_risk_score(&result.findings)
    }

    /// Highest-contributing categories first.
    pub fn top_categories(&self, n: usize) -> &[CategoryBreakdown] {
        &self.breakdown[..n.min(self.breakdown.len())]
    }

    pub fn explain(&self, n: usize) -> String {
        let mut out = format!(
            "Score {}/100 (grade {}, {:?} risk)",
            self.score, self.grade, self.level
        );
        for item in self.top_categories(n) {
            out.push_str(&format!(
                "\n  - {}: {} issue(s) (-{} pts)",
                item.category, item.count, item.contribution
            ));
        }
        out.push('\n');
        out.push_str(&self.recommendation);
        out
    }
}

pub fn category_weight(kind: FindingKind) -> f64 {
    match kind {
        FindingKind::CommandInjection | FindingKind::CodeInjection => 1.5,
        FindingKind::HardcodedSecret => 1.2,
        FindingKind::SemanticAnalysis => 1.3,
        FindingKind::FileSystem => 1.0,
        FindingKind::DependencyAudit => 1.1,
        FindingKind::AgentSkill | FindingKind::CustomRule => 1.2,
        FindingKind::MalwareScan => 2.0,
        _ => 1.0,
    }
}

fn grade_for(score: u8) -> (Grade, RiskLevel, &'static str) {
    match score {
        90..=u8::MAX => (
            Grade::A,
            RiskLevel::Safe,
            "This skill appears safe for deployment. Continue monitoring for new vulnerabilities.",
        ),
        75..=89 => (
            Grade::B,
            RiskLevel::Low,
            "Minor issues detected. Review findings and apply recommended fixes before production use.",
        ),
        50..=74 => (
            Grade::C,
            RiskLevel::Medium,
            "Significant vulnerabilities found. Do not deploy until all high/critical issues are resolved.",
        ),
        25..=49 => (
            Grade::D,
            RiskLevel::High,
            "Severe security risks detected. This skill requires immediate security review and remediation.",
        ),
        _ => (
            Grade::F,
            RiskLevel::Critical,
            "CRITICAL: This skill is potentially malicious or extremely vulnerable. Do NOT deploy under any circumstances.",
        ),
    }
}

/// Score a finished finding set: 100 minus weighted penalties, clamped to [0, 100].
pub fn calculate_risk_score(findings: &[Finding]) -> RiskAssessment {
    let mut total_penalty = 0.0;
    let mut per_kind: BTreeMap<FindingKind, (usize, f64)> = BTreeMap::new();

    for finding in findings {
        let penalty = finding.severity.weight() * category_weight(finding.kind);
        total_penalty += penalty;
        let entry = per_kind.entry(finding.kind).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += penalty;
    }

    let score = (100.0 - total_penalty).clamp(0.0, 100.0).round() as u8;
    let (grade, level, recommendation) = grade_for(score);

    let mut breakdown: Vec<CategoryBreakdown> = per_kind
        .into_iter()
        .map(|(category, (count, penalty))| CategoryBreakdown {
            category,
            weight: category_weight(category),
            count,
            contribution: penalty.round() as u32,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.contribution
            .cmp(&a.contribution)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });

    RiskAssessment {
        score,
        grade,
        level,
        breakdown,
        recommendation: recommendation.to_string(),
    }
}
