mod error;
mod extract;
mod request;
mod result;

pub use error::ClassifyError;
pub use extract::{locate_json, parse_reply, reply_text, ExtractionMode};
pub use request::{build_request_body, POSTURE_PROMPT};
pub use result::{
    AttentionCategory, BackShape, ClassificationResult, FailureKind, GazeTarget, HeadPosition,
    PostureCategory, DEFAULT_REMINDER, MAX_ALERT_ISSUES,
};

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::config::{ApiConfig, ConfigError};
use crate::http_client;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

/// Upper bound on a classifier response body.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;
/// Characters of an HTTP error body kept in the error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Turns one JPEG frame into a verdict. Implementations never fail; problems
/// come back as an error result.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &[u8]) -> ClassificationResult;
}

/// Client for a DashScope-style multimodal generation endpoint.
pub struct RemoteClassifier {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
    extraction: ExtractionMode,
}

impl RemoteClassifier {
    pub fn new(api: &ApiConfig) -> Result<Self, ConfigError> {
        let api_key = api.api_key()?.to_string();
        Ok(Self {
            agent: http_client::agent(api.timeout()),
            endpoint: api.url.clone(),
            model: api.model.clone(),
            api_key,
            timeout: api.timeout(),
            extraction: api.extraction,
        })
    }

    fn fetch_reply(&self, image: &[u8]) -> Result<String, ClassifyError> {
        let body = build_request_body(&self.model, image);
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|err| self.map_request_error(err))?;

        let text = http_client::read_text_limited(response, MAX_RESPONSE_BYTES)
            .map_err(ClassifyError::Body)?;
        let value: Value = serde_json::from_str(&text).map_err(ClassifyError::ResponseJson)?;
        reply_text(&value).map(str::to_string)
    }

    fn map_request_error(&self, err: ureq::Error) -> ClassifyError {
        match err {
            ureq::Error::Status(status, response) => {
                let body = http_client::read_text_limited(response, MAX_RESPONSE_BYTES)
                    .unwrap_or_default();
                if let Some(api_err) = serde_json::from_str::<Value>(&body)
                    .ok()
                    .as_ref()
                    .and_then(extract::api_error)
                {
                    return api_err;
                }
                ClassifyError::Status {
                    status,
                    body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
                }
            }
            ureq::Error::Transport(transport) if http_client::is_timeout(&transport) => {
                ClassifyError::Timeout(self.timeout.as_secs())
            }
            ureq::Error::Transport(transport) => ClassifyError::Transport(transport.to_string()),
        }
    }
}

impl Classifier for RemoteClassifier {
    fn classify(&self, image: &[u8]) -> ClassificationResult {
        let started = Instant::now();
        log_debug!("Sending {} byte frame to {}", image.len(), self.endpoint);

        let reply = match self.fetch_reply(image) {
            Ok(reply) => reply,
            Err(err) => {
                log_warn!("classifier request failed after {}ms: {err}", started.elapsed().as_millis());
                return ClassificationResult::failure(err.kind(), err.to_string());
            }
        };

        match parse_reply(&reply, self.extraction) {
            Ok(result) => {
                log_info!(
                    "classified frame in {}ms: posture={:?} attention={:?}",
                    started.elapsed().as_millis(),
                    result.posture.as_ref().map(PostureCategory::as_str),
                    result.attention.as_ref().map(AttentionCategory::as_str),
                );
                result
            }
            Err(err) => {
                log_warn!("could not parse model reply: {err}");
                ClassificationResult::failure_with_raw(err.kind(), err.to_string(), reply)
            }
        }
    }
}
