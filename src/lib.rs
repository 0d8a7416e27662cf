pub mod capture;
pub mod classifier;
pub mod cli;
pub mod config;
mod http_client;
pub mod monitor;
pub mod report;
pub mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capture::{prepare_upload, CommandCamera, FileImageSource, ImageSource};
use classifier::{Classifier, RemoteClassifier};
use cli::{CliArgs, Command};
use config::{MonitorConfig, CONFIG_PATH_ENV};
use monitor::{MonitorController, MonitorSettings};
use report::{ConsolePresenter, OutputFormat};

const ENABLE_LOGS: bool = true;

/// How long exit waits for a capture or request abandoned by Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub fn run() -> Result<()> {
    let args = CliArgs::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    utils::logging::init(level);

    let config = load_config(&args)?;
    let format = args.format();
    match args.command {
        Command::Scenes => list_scenes(&config, format),
        Command::CaptureTest => capture_test(&config),
        Command::Analyze { image } => analyze(&config, image, format),
        Command::Run { scene } => run_monitor(config, scene.as_deref(), format),
    }
}

fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = MonitorConfig::load(path.as_deref())?.with_api_key_from_env();
    Ok(config)
}

fn list_scenes(config: &MonitorConfig, format: OutputFormat) -> Result<()> {
    let cost_per_check = config.monitor.cost_per_check;

    if format == OutputFormat::Json {
        let scenes: Vec<serde_json::Value> = config
            .scenes
            .iter()
            .map(|scene| {
                serde_json::json!({
                    "name": scene.name,
                    "interval_secs": scene.interval_secs,
                    "description": scene.description,
                    "default": scene.name == config.monitor.default_scene,
                    "estimated_monthly_cost": scene.estimated_monthly_cost(cost_per_check),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&scenes)?);
        return Ok(());
    }

    for scene in &config.scenes {
        let marker = if scene.name == config.monitor.default_scene {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<8} every {:>4}s  ~¥{:.2}/month  {}",
            scene.name,
            scene.interval_secs,
            scene.estimated_monthly_cost(cost_per_check),
            scene.description
        );
    }
    println!("(* default; estimate assumes 4h/day for 30 days)");
    Ok(())
}

fn capture_test(config: &MonitorConfig) -> Result<()> {
    let camera = CommandCamera::from_config(&config.capture)?;
    let bytes = camera.capture().context("capture test failed")?;

    match image::load_from_memory(&bytes) {
        Ok(decoded) => println!(
            "Captured {} bytes ({}x{})",
            bytes.len(),
            decoded.width(),
            decoded.height()
        ),
        Err(err) => {
            log_warn!("captured file is not a decodable image: {err}");
            println!("Captured {} bytes", bytes.len());
        }
    }

    let upload = prepare_upload(&bytes, &config.image);
    println!("Upload size after compression: {} bytes", upload.len());
    Ok(())
}

fn analyze(config: &MonitorConfig, image: PathBuf, format: OutputFormat) -> Result<()> {
    let source = FileImageSource::new(image);
    let bytes = source.capture()?;
    let classifier = RemoteClassifier::new(&config.api)?;

    let result = classifier.classify(&prepare_upload(&bytes, &config.image));
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
        OutputFormat::Text => print!("{}", report::render_result(1, &result)),
    }
    Ok(())
}

fn run_monitor(config: MonitorConfig, scene: Option<&str>, format: OutputFormat) -> Result<()> {
    let camera: Arc<dyn ImageSource> = Arc::new(CommandCamera::from_config(&config.capture)?);
    let classifier: Arc<dyn Classifier> = Arc::new(RemoteClassifier::new(&config.api)?);
    let settings = MonitorSettings::from_config(&config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let outcome = runtime.block_on(async move {
        let (mut controller, events) = MonitorController::new(camera, classifier, settings);
        if let Some(name) = scene {
            controller.select_scene(name)?;
        }

        let presenter = tokio::spawn(ConsolePresenter::new(std::io::stdout(), format).run(events));
        controller.start()?;

        if let Err(err) = tokio::signal::ctrl_c().await {
            log_error!("failed to listen for Ctrl-C: {err}");
        }
        controller.stop().await;
        let stats = controller.stats().await;
        // Dropping the controller closes the event channel so the presenter finishes.
        drop(controller);

        match presenter.await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => log_warn!("console output failed: {err}"),
            Err(err) => log_warn!("presenter task failed: {err}"),
        }
        log_info!(
            "session finished: {} checks, {} warnings",
            stats.checks,
            stats.warnings
        );
        Ok::<(), anyhow::Error>(())
    });

    shutdown_runtime(runtime);
    outcome
}

/// A blocking capture or request cut loose by stop may still be running;
/// dropping the runtime would wait for it indefinitely.
fn shutdown_runtime(runtime: tokio::runtime::Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}
