use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one independent validation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCheck {
    /// "structural", "quality", "task_specific", "semantic", "consistency".
    pub name: String,
    pub passed: bool,
    /// 0–100 score for this dimension.
    pub score: u8,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationCheck {
    pub fn pass(name: &str, score: u8) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            score,
            issues: Vec::new(),
        }
    }

    pub fn fail(name: &str, score: u8, issues: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            score,
            issues,
        }
    }
}

/// Combined verdict over all checks for one task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub task_id: Uuid,
    pub checks: Vec<ValidationCheck>,
    pub passed: bool,
    /// passed checks / total checks.
    pub success_rate: f64,
    /// `round(success_rate * 100)`.
    pub confidence: u8,
    /// Remediation hints derived from failing checks, deduplicated, max 5.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    /// Aggregate a set of checks against a pass threshold.
    pub fn aggregate(task_id: Uuid, checks: Vec<ValidationCheck>, threshold: f64) -> Self {
        let total = checks.len().max(1);
        let passed_checks = checks.iter().filter(|c| c.passed).count();
        let success_rate = passed_checks as f64 / total as f64;
        Self {
            task_id,
            checks,
            passed: success_rate >= threshold,
            success_rate,
            confidence: (success_rate * 100.0).round() as u8,
            recommendations: Vec::new(),
        }
    }

    /// All issues across failing checks.
    pub fn failing_issues(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .flat_map(|c| c.issues.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_threshold() {
        let checks = vec![
            ValidationCheck::pass("structural", 100),
            ValidationCheck::pass("quality", 90),
            ValidationCheck::fail("task_specific", 20, vec!["content too short".into()]),
            ValidationCheck::pass("semantic", 80),
            ValidationCheck::pass("consistency", 100),
        ];
        let report = ValidationReport::aggregate(Uuid::new_v4(), checks, 0.70);
        assert!(report.passed);
        assert_eq!(report.confidence, 80);
        assert_eq!(report.failing_issues(), vec!["content too short"]);

        let checks = vec![
            ValidationCheck::pass("structural", 100),
            ValidationCheck::fail("quality", 10, vec![]),
            ValidationCheck::fail("task_specific", 20, vec![]),
            ValidationCheck::pass("semantic", 80),
            ValidationCheck::pass("consistency", 100),
        ];
        let strict = ValidationReport::aggregate(Uuid::new_v4(), checks, 0.90);
        assert!(!strict.passed);
        assert_eq!(strict.confidence, 60);
    }
}
