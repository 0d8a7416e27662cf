use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Preset selected when neither the config file nor the CLI names one.
pub const DEFAULT_SCENE: &str = "标准监督";

/// Assumed daily monitoring time used by the cost estimate.
const HOURS_PER_DAY: f64 = 4.0;
const DAYS_PER_MONTH: f64 = 30.0;

/// A named capture-interval preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    pub interval_secs: u64,
    #[serde(default)]
    pub description: String,
}

impl SceneConfig {
    pub fn new(name: impl Into<String>, interval_secs: u64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval_secs,
            description: description.into(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn checks_per_hour(&self) -> f64 {
        if self.interval_secs == 0 {
            return 0.0;
        }
        3600.0 / self.interval_secs as f64
    }

    /// Rough API spend for a month of four-hour days at this interval.
    pub fn estimated_monthly_cost(&self, cost_per_check: f64) -> f64 {
        self.checks_per_hour() * cost_per_check * HOURS_PER_DAY * DAYS_PER_MONTH
    }
}

pub fn default_scenes() -> Vec<SceneConfig> {
    vec![
        SceneConfig::new("严格监督", 60, "1分钟/次，适合考试前"),
        SceneConfig::new(DEFAULT_SCENE, 120, "2分钟/次，日常作业"),
        SceneConfig::new("适度监督", 300, "5分钟/次，自主性好"),
        SceneConfig::new("自定义", 180, "自定义间隔"),
    ]
}
