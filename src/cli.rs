use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::report::OutputFormat;

/// Periodic posture checks through a cloud vision model.
///
/// The API key is read from STUDY_MONITOR_API_KEY unless the config names
/// another variable.
#[derive(Debug, Parser)]
#[command(name = "study-monitor", version, arg_required_else_help = true)]
pub struct CliArgs {
    /// JSON config file (falls back to STUDY_MONITOR_CONFIG).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Print events as JSON lines.
    #[arg(long = "json", action = clap::ArgAction::SetTrue, global = true)]
    pub json: bool,
    /// Debug logging (RUST_LOG overrides).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::SetTrue, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Monitor until Ctrl-C, optionally with a named scene.
    Run {
        #[arg(short = 's', long = "scene", value_name = "NAME")]
        scene: Option<String>,
    },
    /// Take one photo and report its size.
    CaptureTest,
    /// Classify an existing image file once.
    Analyze {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// List presets with their intervals and cost estimates.
    Scenes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{error::ErrorKind, CommandFactory};

    #[test]
    fn definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn run_with_scene_and_global_flags() {
        let args = CliArgs::try_parse_from([
            "study-monitor",
            "--config",
            "monitor.json",
            "run",
            "--scene",
            "严格监督",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("monitor.json")));
        assert_eq!(args.format(), OutputFormat::Json);
        assert!(!args.verbose);
        assert_eq!(
            args.command,
            Command::Run {
                scene: Some("严格监督".into())
            }
        );
    }

    #[test]
    fn analyze_takes_an_image_path() {
        let args = CliArgs::try_parse_from(["study-monitor", "analyze", "desk.jpg", "-v"]).unwrap();
        assert!(args.verbose);
        assert_eq!(args.format(), OutputFormat::Text);
        assert_eq!(
            args.command,
            Command::Analyze {
                image: PathBuf::from("desk.jpg")
            }
        );
        assert!(CliArgs::try_parse_from(["study-monitor", "analyze"]).is_err());
    }

    #[test]
    fn subcommands_use_kebab_case() {
        let args = CliArgs::try_parse_from(["study-monitor", "capture-test"]).unwrap();
        assert_eq!(args.command, Command::CaptureTest);
        let args = CliArgs::try_parse_from(["study-monitor", "scenes"]).unwrap();
        assert_eq!(args.command, Command::Scenes);
    }

    #[test]
    fn no_arguments_shows_help() {
        let err = CliArgs::try_parse_from(["study-monitor"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);
        let err = CliArgs::try_parse_from(["study-monitor", "scenes", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn rejects_unknown_commands_and_flags() {
        assert!(CliArgs::try_parse_from(["study-monitor", "explode"]).is_err());
        assert!(CliArgs::try_parse_from(["study-monitor", "run", "--fast"]).is_err());
        assert!(CliArgs::try_parse_from(["study-monitor", "run", "--scene"]).is_err());
    }
}
