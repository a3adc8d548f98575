//! Caller side of the relay: turns `/ask` answers into display text

use std::time::Duration;

use log::{debug, error};
use serde_json::Value;

use crate::error::Error;

const ASK_TIMEOUT: Duration
  = Duration::from_secs(crate::DEFAULT_GENERATE_TIMEOUT_SECS);
const PING_TIMEOUT: Duration
  = Duration::from_secs(crate::DEFAULT_HEALTH_TIMEOUT_SECS);

/// Talks to a running relay the way a chat front end does
#[derive(Debug, Clone)]
pub struct RelayCaller
{   base_url: String
  , ask_timeout: Duration
  , http_client: reqwest::Client
}

impl RelayCaller
{   pub fn new(base_url: impl Into<String>) -> Result<Self, Error>
    {   let base_url = base_url.into();
        if base_url.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "relay URL must not be empty".to_string()
            ));
        }
        let http_client = reqwest::Client::builder()
          .build()
          .map_err(|e| Error::HttpClient(e.to_string()))?;
        Ok(RelayCaller
        {   base_url: base_url.trim_end_matches('/').to_string()
          , ask_timeout: ASK_TIMEOUT
          , http_client
        })
    }

    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self
    {   self.ask_timeout = timeout;
        self
    }

    /// Ask the relay and return text fit for display. Never fails:
    /// faults come back as readable error strings.
    pub async fn ask(&self, prompt: &str) -> String
    {   debug!("Asking relay at {}", self.base_url);
        let result = self.http_client
          .get(format!("{}/ask", self.base_url))
          .query(&[("prompt", prompt)])
          .timeout(self.ask_timeout)
          .send()
          .await;

        let response = match result
        {   Ok(response) => response
          , Err(e) => {
              error!("Relay request failed: {}", e);
              return format!("Connection Error: {}", e);
            }
        };

        let status = response.status().as_u16();
        match response.text().await
        {   Ok(body) => render_reply(status, &body)
          , Err(e) => format!("Connection Error: {}", e)
        }
    }

    /// True iff the relay's root route answers 200
    pub async fn is_relay_up(&self) -> bool
    {   match self.http_client
          .get(format!("{}/", self.base_url))
          .timeout(PING_TIMEOUT)
          .send()
          .await
        {   Ok(response) => response.status() == reqwest::StatusCode::OK
          , Err(e) => {
              debug!("Relay ping failed: {}", e);
              false
            }
        }
    }
}

/// Map a relay answer onto the string shown to the user
pub fn render_reply(status: u16, body: &str) -> String
{   if status != 200
    {   return format!("API Error: {} - {}", status, body);
    }
    let parsed: Value = match serde_json::from_str(body)
    {   Ok(value) => value
      , Err(_) => return body.to_string()
    };
    if let Some(error) = parsed.get("error")
    {   let text = error.as_str()
          .map(str::to_string)
          .unwrap_or_else(|| error.to_string());
        return format!("Error: {}", text);
    }
    match parsed.get("response").and_then(Value::as_str)
    {   Some(text) => text.to_string()
      , None => parsed.to_string()
    }
}
