use serde::Serialize;

use crate::classifier::ClassificationResult;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MonitorStatus {
    #[default]
    Idle,
    Running,
}

/// Running totals for the life of the controller. Not reset by stop/start.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Reported results, error results included.
    pub checks: u64,
    /// Results whose posture needed attention.
    pub warnings: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one reported result. Returns whether it raised a warning.
    pub fn record(&mut self, result: &ClassificationResult) -> bool {
        self.checks += 1;
        let flagged = result.needs_attention();
        if flagged {
            self.warnings += 1;
        }
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FailureKind, PostureCategory};

    fn with_posture(posture: PostureCategory) -> ClassificationResult {
        ClassificationResult {
            present: Some(true),
            posture: Some(posture),
            ..Default::default()
        }
    }

    #[test]
    fn counts_checks_and_bad_postures() {
        let mut stats = SessionStats::new();
        assert!(!stats.record(&with_posture(PostureCategory::Good)));
        assert!(stats.record(&with_posture(PostureCategory::NeedsImprovement)));
        assert!(stats.record(&with_posture(PostureCategory::Unhealthy)));
        assert!(!stats.record(&ClassificationResult::failure(FailureKind::Capture, "no camera")));
        assert_eq!(stats, SessionStats { checks: 4, warnings: 2 });
    }

    #[test]
    fn issues_alone_do_not_raise_a_warning() {
        let mut stats = SessionStats::new();
        let result = ClassificationResult {
            posture: Some(PostureCategory::Good),
            issues: vec!["光线偏暗".into()],
            ..Default::default()
        };
        assert!(!stats.record(&result));
        assert_eq!(stats.warnings, 0);
    }
}
