//! Console rendering of monitor events: the reference consumer of the event
//! channel.

use std::fmt::{Display, Write as _};
use std::io::{self, Write};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::classifier::ClassificationResult;
use crate::monitor::{CyclePhase, MonitorEvent, SessionStats};

/// Issues listed inline under a result; alerts carry their own list.
const INLINE_ISSUES: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn or_unknown<T: Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

pub fn render_result(check: u64, result: &ClassificationResult) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Check #{check}");

    if let Some(error) = &result.error {
        let _ = writeln!(text, "Error: {error}");
        return text;
    }
    if result.present == Some(false) {
        let _ = writeln!(text, "Nobody detected");
        return text;
    }

    let _ = writeln!(text, "Posture: {}", or_unknown(result.posture.as_ref()));
    let _ = writeln!(text, "Attention: {}", or_unknown(result.attention.as_ref()));
    if !result.issues.is_empty() {
        let shown: Vec<&str> = result
            .issues
            .iter()
            .take(INLINE_ISSUES)
            .map(String::as_str)
            .collect();
        let _ = writeln!(text, "Issues: {}", shown.join(", "));
    }
    if let Some(first) = result.suggestions.first() {
        let _ = writeln!(text, "Suggestion: {first}");
    }
    text
}

pub fn render_stats(stats: &SessionStats) -> String {
    format!("Checks: {} | Warnings: {}", stats.checks, stats.warnings)
}

pub fn render_alert(issues: &[String]) -> String {
    let mut text = String::from("Posture reminder\n");
    for issue in issues {
        let _ = writeln!(text, "  ⚠ {issue}");
    }
    text
}

pub fn render_phase(phase: &CyclePhase) -> String {
    match phase {
        CyclePhase::Capturing => "Taking photo...".to_string(),
        CyclePhase::Analyzing => "Analyzing...".to_string(),
        CyclePhase::Waiting { next_in_secs } => format!("Next check in {next_in_secs}s"),
        CyclePhase::BackingOff { retry_in_secs } => format!("Retrying in {retry_in_secs}s"),
    }
}

pub struct ConsolePresenter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn present(&mut self, event: &MonitorEvent) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            serde_json::to_writer(&mut self.out, event)?;
            writeln!(self.out)?;
            return self.out.flush();
        }

        match event {
            MonitorEvent::Started {
                scene,
                interval_secs,
            } => writeln!(self.out, "Monitoring started: {scene} (every {interval_secs}s)")?,
            MonitorEvent::Phase { phase } => writeln!(self.out, "{}", render_phase(phase))?,
            MonitorEvent::Result {
                check,
                result,
                stats,
                at,
            } => {
                writeln!(self.out, "[{}]", at.format("%H:%M:%S"))?;
                write!(self.out, "{}", render_result(*check, result))?;
                writeln!(self.out, "{}", render_stats(stats))?;
            }
            MonitorEvent::Alert { issues } => write!(self.out, "{}", render_alert(issues))?,
            MonitorEvent::Stopped { stats } => {
                writeln!(self.out, "Monitoring stopped. {}", render_stats(stats))?
            }
        }
        self.out.flush()
    }

    /// Drain `events` until every sender is gone.
    pub async fn run(mut self, mut events: UnboundedReceiver<MonitorEvent>) -> io::Result<W> {
        while let Some(event) = events.recv().await {
            self.present(&event)?;
        }
        Ok(self.out)
    }
}
