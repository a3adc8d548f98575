//! Request, result and failure types shared by the client and relay

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload keys the client owns; `extra` may not set them
pub const RESERVED_KEYS: [&str; 3] = ["prompt", "model", "stream"];

/// Per-call options. Unset fields fall back to client defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions
{   /// Model override
    pub model: Option<String>
  , /// Timeout override for this call
    pub timeout: Option<Duration>
  , /// Backend-specific keys copied into the top level of the
    /// payload (`options`, `system`, `format`, `keep_alive`, ...)
    pub extra: Map<String, Value>
}

impl GenerationOptions
{   pub fn with_model(mut self, model: impl Into<String>) -> Self
    {   self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self
    {   self.timeout = Some(timeout);
        self
    }

    pub fn with_extra(
      mut self
    , key: impl Into<String>
    , value: Value
    ) -> Self
    {   self.extra.insert(key.into(), value);
        self
    }
}

/// Fully resolved request, serialized as the backend payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest
{   pub prompt: String
  , pub model: String
  , pub stream: bool
  , #[serde(flatten)]
    pub extra: Map<String, Value>
  , #[serde(skip)]
    pub timeout: Duration
}

impl GenerationRequest
{   /// Merge caller options over client defaults.
    ///
    /// Rejects an empty prompt and reserved keys in `extra`, so a
    /// bad request never reaches the network.
    pub fn resolve(
      prompt: &str
    , options: GenerationOptions
    , default_model: &str
    , default_timeout: Duration
    ) -> Result<Self, Failure>
    {   if prompt.trim().is_empty()
        {   return Err(Failure::client_input(
              "prompt must not be empty"
            ));
        }
        if let Some(key) = options.extra.keys()
          .find(|k| RESERVED_KEYS.contains(&k.as_str()))
        {   return Err(Failure::client_input(format!(
              "option '{}' is reserved and cannot be passed as an extra",
              key
            )));
        }
        let model = options.model
          .filter(|m| !m.trim().is_empty())
          .unwrap_or_else(|| default_model.to_string());

        Ok(GenerationRequest
        {   prompt: prompt.to_string()
          , model
          , stream: false
          , extra: options.extra
          , timeout: options.timeout.unwrap_or(default_timeout)
        })
    }
}

/// A successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation
{   /// The backend's generated-text field, when the body has one
    pub text: Option<String>
  , /// Every other top-level field of the backend response
    pub metadata: Map<String, Value>
  , /// Response body exactly as the backend sent it
    pub body: String
  , /// Content type reported by the backend
    pub content_type: String
}

/// Why a call did not produce a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind
{   /// Missing or unusable caller input; no backend call was made
    ClientInput
  , /// Connection to the backend could not be established
    BackendUnavailable
  , /// Backend did not answer within the configured window
    Timeout
  , /// Backend answered with a non-success status or bad payload
    BackendError
}

impl fmt::Display for FailureKind
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   let label = match self
        {   FailureKind::ClientInput => "client input error"
          , FailureKind::BackendUnavailable => "backend unavailable"
          , FailureKind::Timeout => "backend timed out"
          , FailureKind::BackendError => "backend error"
        };
        f.write_str(label)
    }
}

/// Normalized failure. Serializes as the relay's error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure
{   pub kind: FailureKind
  , #[serde(rename = "error")]
    pub message: String
  , #[serde(default)]
    pub success: bool
}

impl Failure
{   pub fn new(kind: FailureKind, message: impl Into<String>) -> Self
    {   Failure
        {   kind
          , message: message.into()
          , success: false
        }
    }

    pub fn client_input(message: impl Into<String>) -> Self
    {   Failure::new(FailureKind::ClientInput, message)
    }
}

impl fmt::Display for Failure
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Tagged outcome of a generation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult
{   Success(Generation)
  , Failure(Failure)
}

impl GenerationResult
{   pub fn is_success(&self) -> bool
    {   matches!(self, GenerationResult::Success(_))
    }

    pub fn into_result(self) -> Result<Generation, Failure>
    {   match self
        {   GenerationResult::Success(generation) => Ok(generation)
          , GenerationResult::Failure(failure) => Err(failure)
        }
    }
}

impl From<Result<Generation, Failure>> for GenerationResult
{   fn from(result: Result<Generation, Failure>) -> Self
    {   match result
        {   Ok(generation) => GenerationResult::Success(generation)
          , Err(failure) => GenerationResult::Failure(failure)
        }
    }
}

/// One entry of the backend's model listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTag
{   pub name: String
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>
}
