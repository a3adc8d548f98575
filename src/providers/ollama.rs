use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, error, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::GenerationClient;
use crate::config::BackendConfig;
use crate::error::Error;
use crate::request::
{   Failure
  , FailureKind
  , Generation
  , GenerationOptions
  , GenerationRequest
  , GenerationResult
  , ModelTag
};

const GENERATE_PATH: &str = "/api/generate";
const TAGS_PATH: &str = "/api/tags";
const DEFAULT_CONTENT_TYPE: &str = "application/json";
const MAX_ERROR_BODY_CHARS: usize = 200;

// ===== Wire Types =====

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaTagsResponse
{   #[serde(default)]
    pub models: Vec<ModelTag>
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaErrorBody
{   error: String
}

// ===== Ollama Client =====

/// Client for an Ollama server's generate and tags routes
#[derive(Debug, Clone)]
pub struct OllamaClient
{   base_url: String
  , model: String
  , generate_timeout: Duration
  , health_timeout: Duration
  , list_models_timeout: Duration
  , http_client: reqwest::Client
}

impl OllamaClient
{   pub fn new(config: &BackendConfig) -> Result<Self, Error>
    {   config.validate()?;
        let http_client = reqwest::Client::builder()
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            Error::HttpClient(e.to_string())
          })?;

        let base_url = config.normalized_base_url();
        debug!(
          "Creating OllamaClient for {} (model {})",
          base_url, config.model
        );
        Ok(OllamaClient
        {   base_url
          , model: config.model.clone()
          , generate_timeout: config.generate_timeout()
          , health_timeout: config.health_timeout()
          , list_models_timeout: config.list_models_timeout()
          , http_client
        })
    }

    pub fn base_url(&self) -> &str
    {   &self.base_url
    }

    pub fn generate_url(&self) -> String
    {   format!("{}{}", self.base_url, GENERATE_PATH)
    }

    pub fn tags_url(&self) -> String
    {   format!("{}{}", self.base_url, TAGS_PATH)
    }

    async fn send_generate(
      &self
    , request: &GenerationRequest
    ) -> Result<Generation, Failure>
    {   trace!("Ollama request: {:?}", request);

        let response = self.http_client
          .post(self.generate_url())
          .timeout(request.timeout)
          .json(request)
          .send()
          .await
          .map_err(map_transport_error)?;

        let status = response.status();
        trace!("Ollama response status: {}", status);

        let content_type = response.headers()
          .get(CONTENT_TYPE)
          .and_then(|v| v.to_str().ok())
          .unwrap_or(DEFAULT_CONTENT_TYPE)
          .to_string();
        let body = response.text().await
          .map_err(map_transport_error)?;

        if !status.is_success()
        {   let failure = map_http_error(status, &body);
            error!("Ollama generate failed: {}", failure);
            return Err(failure);
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
          error!("Malformed generate response: {}", e);
          Failure::new(
            FailureKind::BackendError,
            format!("Ollama API error: malformed generate response: {}", e)
          )
        })?;
        let (text, metadata) = split_generated_text(parsed);
        if text.is_none()
        {   warn!("Generate response carried no 'response' text field");
        }

        Ok(Generation
        {   text
          , metadata
          , body
          , content_type
        })
    }

    async fn fetch_tags(&self) -> Result<Vec<ModelTag>, Failure>
    {   let response = self.http_client
          .get(self.tags_url())
          .timeout(self.list_models_timeout)
          .send()
          .await
          .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await
          .map_err(map_transport_error)?;
        if !status.is_success()
        {   return Err(map_http_error(status, &body));
        }

        let tags: OllamaTagsResponse = serde_json::from_str(&body)
          .map_err(|e| Failure::new(
            FailureKind::BackendError,
            format!("Failed to list models: malformed tags response: {}", e)
          ))?;
        Ok(tags.models)
    }
}

#[async_trait]
impl GenerationClient for OllamaClient
{   fn backend_name(&self) -> &str
    {   "ollama"
    }

    async fn generate(
      &self
    , prompt: &str
    , options: GenerationOptions
    ) -> GenerationResult
    {   let request = match GenerationRequest::resolve(
          prompt,
          options,
          &self.model,
          self.generate_timeout
        )
        {   Ok(request) => request
          , Err(failure) => {
              warn!("Rejected generate call: {}", failure.message);
              return GenerationResult::Failure(failure);
            }
        };

        debug!(
          "Generating with model {} (timeout {:?})",
          request.model, request.timeout
        );
        self.send_generate(&request).await.into()
    }

    async fn is_healthy(&self) -> bool
    {   let result = self.http_client
          .get(self.tags_url())
          .timeout(self.health_timeout)
          .send()
          .await;

        match result
        {   Ok(response) => {
              let healthy = response.status() == StatusCode::OK;
              debug!(
                "Health probe returned {} (healthy: {})",
                response.status(), healthy
              );
              healthy
            }
          , Err(e) => {
              debug!("Health probe failed: {}", e);
              false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelTag>, Failure>
    {   debug!("Listing models from {}", self.tags_url());
        let models = self.fetch_tags().await.map_err(|failure| {
          error!("Failed to list models: {}", failure);
          failure
        })?;
        debug!("Retrieved {} models", models.len());
        Ok(models)
    }
}

/// Pull the string `response` field out of a generate body; every
/// other top-level field becomes metadata
fn split_generated_text(parsed: Value)
  -> (Option<String>, Map<String, Value>)
{   let mut fields = match parsed
    {   Value::Object(fields) => fields
      , _ => return (None, Map::new())
    };
    match fields.remove("response")
    {   Some(Value::String(text)) => (Some(text), fields)
      , Some(other) => {
          fields.insert("response".to_string(), other);
          (None, fields)
        }
      , None => (None, fields)
    }
}

// ===== Failure Mapping =====

fn map_transport_error(e: reqwest::Error) -> Failure
{   if e.is_timeout()
    {   warn!("Ollama request timed out: {}", e);
        return Failure::new(
          FailureKind::Timeout,
          format!("Ollama API error: request timed out: {}", e)
        );
    }
    if e.is_connect()
    {   warn!("Ollama unreachable: {}", e);
        return Failure::new(
          FailureKind::BackendUnavailable,
          format!("Ollama backend unavailable: {}", e)
        );
    }
    error!("Ollama transport error: {}", e);
    Failure::new(
      FailureKind::BackendError,
      format!("Ollama API error: {}", e)
    )
}

fn map_http_error(status: StatusCode, body: &str) -> Failure
{   let detail = serde_json::from_str::<OllamaErrorBody>(body)
      .map(|b| b.error)
      .unwrap_or_else(|_| truncate_message(body));
    Failure::new(
      FailureKind::BackendError,
      format!("Ollama API error: HTTP {}: {}", status, detail)
    )
}

fn truncate_message(body: &str) -> String
{   let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS
    {   return trimmed.to_string();
    }
    let mut cut: String = trimmed
      .chars()
      .take(MAX_ERROR_BODY_CHARS)
      .collect();
    cut.push_str("...");
    cut
}
