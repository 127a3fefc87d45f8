//! Risk Scorer

use crate::rules::{DfmIssue, Severity};

pub const MAX_RISK_SCORE: u32 = 100;

impl Severity {
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Low => 10,
            Severity::Medium => 30,
            Severity::High => 50,
        }
    }
}

/// Sum of severity weights, capped at [`MAX_RISK_SCORE`]. Empty is 0.
pub fn risk_score(issues: &[DfmIssue]) -> u32 {
    issues
        .iter()
        .map(|i| i.severity.weight())
        .fold(0u32, u32::saturating_add)
        .min(MAX_RISK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::IssueKind;

    fn issue(severity: Severity) -> DfmIssue {
        DfmIssue {
            kind: IssueKind::ThinWall,
            severity,
            description: String::new(),
            location: None,
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(risk_score(&[]), 0);
    }

    #[test]
    fn test_weights_sum() {
        assert_eq!(risk_score(&[issue(Severity::Low), issue(Severity::Medium)]), 40);
        assert_eq!(risk_score(&[issue(Severity::High)]), 50);
    }

    #[test]
    fn test_capped_at_100() {
        let issues = vec![issue(Severity::High); 3];
        assert_eq!(risk_score(&issues), 100);
    }

    #[test]
    fn test_monotonic_when_adding_issues() {
        let mut issues = Vec::new();
        let mut previous = risk_score(&issues);
        for severity in [Severity::Low, Severity::High, Severity::Medium, Severity::High, Severity::Low] {
            issues.push(issue(severity));
            let score = risk_score(&issues);
            assert!(score >= previous);
            assert!(score <= MAX_RISK_SCORE);
            previous = score;
        }
    }
}
