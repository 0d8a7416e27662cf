use chrono::{DateTime, Local};
use serde::Serialize;

use crate::classifier::ClassificationResult;

use super::state::SessionStats;

/// What the loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CyclePhase {
    Capturing,
    Analyzing,
    Waiting { next_in_secs: u64 },
    BackingOff { retry_in_secs: u64 },
}

/// Messages from the monitor loop to whatever presents them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    Started {
        scene: String,
        interval_secs: u64,
    },
    Phase {
        phase: CyclePhase,
    },
    Result {
        check: u64,
        result: ClassificationResult,
        stats: SessionStats,
        at: DateTime<Local>,
    },
    Alert {
        issues: Vec<String>,
    },
    Stopped {
        stats: SessionStats,
    },
}
