use std::io;

use super::result::FailureKind;

/// Everything that can go wrong between sending a frame and holding a parsed
/// verdict. Converted into an error result at the classifier boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("network error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },
    #[error("failed to read response body: {0}")]
    Body(#[source] io::Error),
    #[error("response body is not JSON: {0}")]
    ResponseJson(#[source] serde_json::Error),
    #[error("unexpected API response: missing output.choices[0].message.content[0].text")]
    UnexpectedShape,
    #[error("no JSON object found in model reply")]
    NoJsonObject,
    #[error("model reply is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("model reply JSON is not an object")]
    NotAnObject,
}

impl ClassifyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::Transport(_) | Self::Status { .. } | Self::Body(_) => {
                FailureKind::Network
            }
            Self::Api { .. } | Self::ResponseJson(_) | Self::UnexpectedShape => {
                FailureKind::Response
            }
            Self::NoJsonObject | Self::InvalidJson(_) | Self::NotAnObject => FailureKind::Parse,
        }
    }
}
