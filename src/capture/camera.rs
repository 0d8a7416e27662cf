use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use uuid::Uuid;

use crate::config::{CaptureConfig, PATH_PLACEHOLDER};

use super::{CaptureError, ImageSource};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Takes a photo by running an external camera program that writes a JPEG to
/// the path substituted for `{path}`.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    argv: Vec<String>,
    output_path: Option<PathBuf>,
    wait: Duration,
}

impl CommandCamera {
    pub fn new(
        argv: Vec<String>,
        output_path: Option<PathBuf>,
        wait: Duration,
    ) -> Result<Self, CaptureError> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(CaptureError::EmptyCommand);
        }
        Ok(Self {
            argv,
            output_path,
            wait,
        })
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        Self::new(
            config.command.clone(),
            config.output_path.clone(),
            config.wait(),
        )
    }

    fn target_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("study_monitor_{}.jpg", Uuid::new_v4()))
        })
    }

    /// Run the camera program, killing it if it is still running after `wait`.
    fn run_command(&self, path: &Path) -> Result<(), CaptureError> {
        let program = &self.argv[0];
        let path_arg = path.to_string_lossy();
        let args: Vec<String> = self.argv[1..]
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path_arg))
            .collect();

        log_debug!("Running capture command {} {:?}", program, args);
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: program.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.wait;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    log_warn!("{program} still running after {:?}; killing it", self.wait);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CaptureError::CommandTimeout {
                        program: program.clone(),
                        waited: self.wait,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CaptureError::Spawn {
                        program: program.clone(),
                        source,
                    });
                }
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(CaptureError::CommandFailed {
                program: program.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl ImageSource for CommandCamera {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let started = Instant::now();
        let path = self.target_path();
        // A leftover file from an earlier cycle would otherwise be read back as
        // this cycle's photo.
        let _ = fs::remove_file(&path);

        self.run_command(&path)?;
        wait_for_file(&path, self.wait)?;

        let bytes = fs::read(&path).map_err(|source| CaptureError::Read {
            path: path.clone(),
            source,
        })?;
        let _ = fs::remove_file(&path);

        if bytes.is_empty() {
            return Err(CaptureError::Empty { path });
        }
        log_info!(
            "Captured {} bytes in {}ms",
            bytes.len(),
            started.elapsed().as_millis()
        );
        Ok(bytes)
    }
}

/// Camera apps may return before the file is flushed; poll until it has
/// content or `wait` runs out.
fn wait_for_file(path: &Path, wait: Duration) -> Result<(), CaptureError> {
    let deadline = Instant::now() + wait;
    loop {
        if fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CaptureError::Timeout {
                path: path.to_path_buf(),
                waited: wait,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Serves the same image file on every capture.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for FileImageSource {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let bytes = fs::read(&self.path).map_err(|source| CaptureError::Read {
            path: self.path.clone(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty {
                path: self.path.clone(),
            });
        }
        Ok(bytes)
    }
}
