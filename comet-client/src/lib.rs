use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

pub mod poll;

/// Production endpoint for CometAPI's Replicate-compatible surface.
pub const DEFAULT_API_URL: &str = "https://api.cometapi.com";

const CREATE_PATH: &str = "/replicate/v1/models/black-forest-labs/flux-kontext-max/predictions";
const PREDICTIONS_PATH: &str = "/replicate/v1/predictions";

/// Client for the external image-generation predictions API.
///
/// Creating a prediction is synchronous on the HTTP level but the prediction
/// itself resolves asynchronously; callers follow up via [`get_prediction`]
/// or the [`poll`] module.
///
/// [`get_prediction`]: CometClient::get_prediction
#[derive(Debug, Clone)]
pub struct CometClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl CometClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Point the client at a different API host (staging, test stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Create from the COMET_API_KEY environment variable.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("COMET_API_KEY")
            .map_err(|_| anyhow::anyhow!("COMET_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    /// Submit a generation request and return the freshly created prediction.
    pub async fn create_prediction(&self, input: &PredictionInput) -> anyhow::Result<Prediction> {
        let url = format!("{}{}", self.base_url, CREATE_PATH);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .context("prediction creation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("prediction API error: {} - {}", status, body);
            anyhow::bail!("prediction API error: {} - {}", status, body);
        }

        let prediction: Prediction = response
            .json()
            .await
            .context("failed to decode prediction creation response")?;

        info!("created prediction {} ({:?})", prediction.id, prediction.status);

        Ok(prediction)
    }

    /// Fetch the current state of a prediction by id.
    pub async fn get_prediction(&self, id: &str) -> anyhow::Result<Prediction> {
        let url = format!("{}{}/{}", self.base_url, PREDICTIONS_PATH, id);

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("prediction status request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("prediction status error: {} - {}", status, body);
            anyhow::bail!("prediction API error: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("failed to decode prediction status response")
    }
}

/// Input payload for a generation request.
///
/// `input_image` carries the plan itself; the three optional slots carry
/// material reference images. The external contract stops at three extras.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub prompt: String,
    pub input_image: String,
    pub output_format: String,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image_3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image_4: Option<String>,
}

impl PredictionInput {
    pub fn new(
        prompt: impl Into<String>,
        input_image: impl Into<String>,
        aspect_ratio: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            input_image: input_image.into(),
            output_format: "png".to_string(),
            aspect_ratio: aspect_ratio.into(),
            input_image_2: None,
            input_image_3: None,
            input_image_4: None,
        }
    }

    /// Wire up to three reference image URLs; anything past the third slot is
    /// dropped.
    pub fn with_references(mut self, refs: &[String]) -> Self {
        self.input_image_2 = refs.first().cloned();
        self.input_image_3 = refs.get(1).cloned();
        self.input_image_4 = refs.get(2).cloned();
        self
    }
}

/// Lifecycle states reported by the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Queued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// A prediction as reported by the external service.
///
/// Fields this crate does not interpret are preserved in `extra` so that a
/// proxied prediction re-serializes with everything the upstream sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<PredictionUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Prediction {
    /// Upstream failure description, flattened to plain text.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            Some(Value::String(s)) => Some(s.clone()),
            Some(v) => Some(v.to_string()),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
