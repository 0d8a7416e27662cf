mod camera;
mod compress;

pub use camera::{CommandCamera, FileImageSource};
pub use compress::{compress_jpeg, prepare_upload};

use std::{io, path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture command is empty")]
    EmptyCommand,
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("`{program}` did not finish within {}s", .waited.as_secs_f32())]
    CommandTimeout { program: String, waited: Duration },
    #[error("no image written to {} within {}s", .path.display(), .waited.as_secs_f32())]
    Timeout { path: PathBuf, waited: Duration },
    #[error("image at {} is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Something that can produce one JPEG frame on demand. Blocking; callers run
/// it on a worker thread.
pub trait ImageSource: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}
