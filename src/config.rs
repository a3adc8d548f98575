//! Configuration for the relay and its generation backend

use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const ENV_BIND: &str = "OLLAMA_RELAY_BIND";
pub const ENV_BACKEND_URL: &str = "OLLAMA_RELAY_BACKEND_URL";
pub const ENV_MODEL: &str = "OLLAMA_RELAY_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "OLLAMA_RELAY_TIMEOUT_SECS";

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig
{   /// Backend base URL, without trailing slash
    pub base_url: String
  , /// Model used when a call does not override it
    pub model: String
  , /// Generation timeout in seconds
    pub generate_timeout_secs: u64
  , /// Health probe timeout in seconds
    pub health_timeout_secs: u64
  , /// Model listing timeout in seconds
    pub list_models_timeout_secs: u64
}

impl Default for BackendConfig
{   fn default() -> Self
    {   BackendConfig
        {   base_url: crate::DEFAULT_BACKEND_URL.to_string()
          , model: crate::DEFAULT_MODEL.to_string()
          , generate_timeout_secs: crate::DEFAULT_GENERATE_TIMEOUT_SECS
          , health_timeout_secs: crate::DEFAULT_HEALTH_TIMEOUT_SECS
          , list_models_timeout_secs
              : crate::DEFAULT_LIST_MODELS_TIMEOUT_SECS
        }
    }
}

impl BackendConfig
{   /// Base URL with any trailing slashes removed
    pub fn normalized_base_url(&self) -> String
    {   self.base_url.trim_end_matches('/').to_string()
    }

    pub fn generate_timeout(&self) -> Duration
    {   Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration
    {   Duration::from_secs(self.health_timeout_secs)
    }

    pub fn list_models_timeout(&self) -> Duration
    {   Duration::from_secs(self.list_models_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), Error>
    {   if self.base_url.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "backend base URL must not be empty".to_string()
            ));
        }
        if self.model.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "default model must not be empty".to_string()
            ));
        }
        for (name, secs) in [
          ("generate_timeout_secs", self.generate_timeout_secs)
        , ("health_timeout_secs", self.health_timeout_secs)
        , ("list_models_timeout_secs", self.list_models_timeout_secs)
        ]
        {   if secs == 0
            {   return Err(Error::InvalidConfiguration(
                  format!("{} must be greater than zero", name)
                ));
            }
        }
        Ok(())
    }
}

/// Relay process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig
{   /// Address the relay listens on
    pub bind_addr: String
  , /// Backend settings
    pub backend: BackendConfig
}

impl Default for RelayConfig
{   fn default() -> Self
    {   RelayConfig
        {   bind_addr: crate::DEFAULT_BIND_ADDR.to_string()
          , backend: BackendConfig::default()
        }
    }
}

impl RelayConfig
{   /// Defaults overridden by whichever `OLLAMA_RELAY_*` vars are set
    pub fn from_env() -> Result<Self, Error>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where F: Fn(&str) -> Option<String>
    {   let mut config = RelayConfig::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>)
      -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Loading relay config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let config: RelayConfig = serde_json::from_str(&raw)
          .map_err(|e| Error::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply env-style overrides on top of the current values
    pub fn apply_overrides<F>(&mut self, lookup: F)
      -> Result<(), Error>
    where F: Fn(&str) -> Option<String>
    {   if let Some(bind) = non_empty(lookup(ENV_BIND))
        {   self.bind_addr = bind;
        }
        if let Some(url) = non_empty(lookup(ENV_BACKEND_URL))
        {   self.backend.base_url = url;
        }
        if let Some(model) = non_empty(lookup(ENV_MODEL))
        {   self.backend.model = model;
        }
        if let Some(raw) = non_empty(lookup(ENV_TIMEOUT_SECS))
        {   self.backend.generate_timeout_secs = raw.parse()
              .map_err(|_| Error::InvalidConfiguration(format!(
                "{} must be a whole number of seconds, got {:?}",
                ENV_TIMEOUT_SECS, raw
              )))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error>
    {   if self.bind_addr.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "bind address must not be empty".to_string()
            ));
        }
        self.backend.validate()
    }
}

fn non_empty(value: Option<String>) -> Option<String>
{   value
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
}
