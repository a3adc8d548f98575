//! HTTP relay in front of a `GenerationClient`
//!
//! Every handled outcome is answered with HTTP 200. Successful
//! generations pass the backend body through untouched; failures
//! are serialized as `{"error": ..., "kind": ..., "success": false}`.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::client::SharedClient;
use crate::config::RelayConfig;
use crate::error::Error;
use crate::providers::OllamaClient;
use crate::request::
{   Failure
  , Generation
  , GenerationOptions
  , GenerationResult
  , ModelTag
};

pub const WELCOME_MESSAGE: &str = "Welcome to the Ollama relay!";

#[derive(Clone)]
struct RelayState
{   client: SharedClient
}

#[derive(Debug, Deserialize)]
pub struct AskParams
{   pub prompt: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeBody
{   pub message: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody
{   pub relay: String
  , pub backend_healthy: bool
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsBody
{   pub models: Vec<ModelTag>
}

/// Routes: `/`, `/ask`, `/health`, `/models`
pub fn router(client: SharedClient) -> Router
{   Router::new()
      .route("/", get(welcome))
      .route("/ask", get(ask))
      .route("/health", get(health))
      .route("/models", get(models))
      .with_state(RelayState { client })
}

/// Serve on an already bound listener until the server stops
pub async fn serve(
  listener: TcpListener
, client: SharedClient
) -> Result<(), Error>
{   if let Ok(addr) = listener.local_addr()
    {   info!(
          "Relay listening on {} (backend: {})",
          addr, client.backend_name()
        );
    }
    axum::serve(listener, router(client))
      .await
      .map_err(|e| Error::Serve(e.to_string()))
}

/// Build the Ollama client from `config`, bind, and serve
pub async fn run(config: RelayConfig) -> Result<(), Error>
{   config.validate()?;
    let client: SharedClient = Arc::new(OllamaClient::new(&config.backend)?);
    let listener = TcpListener::bind(&config.bind_addr)
      .await
      .map_err(|e| Error::Serve(format!(
        "failed to bind {}: {}", config.bind_addr, e
      )))?;
    serve(listener, client).await
}

async fn welcome() -> Json<WelcomeBody>
{   Json(WelcomeBody
    {   message: WELCOME_MESSAGE.to_string()
    })
}

async fn ask(
  State(state): State<RelayState>
, query: Result<Query<AskParams>, QueryRejection>
) -> Response
{   let params = match query
    {   Ok(Query(params)) => params
      , Err(rejection) => {
          warn!("Rejected /ask query: {}", rejection.body_text());
          return failure_response(Failure::client_input(format!(
            "invalid query string: {}",
            rejection.body_text()
          )));
        }
    };
    let prompt = match params.prompt
    {   Some(prompt) if !prompt.trim().is_empty() => prompt
      , Some(_) => {
          warn!("Rejected /ask with empty prompt");
          return failure_response(Failure::client_input(
            "query parameter 'prompt' must not be empty"
          ));
        }
      , None => {
          warn!("Rejected /ask without prompt");
          return failure_response(Failure::client_input(
            "missing required query parameter 'prompt'"
          ));
        }
    };

    debug!("Relaying prompt ({} chars)", prompt.chars().count());
    match state.client
      .generate(&prompt, GenerationOptions::default())
      .await
    {   GenerationResult::Success(generation) => {
          passthrough_response(generation)
        }
      , GenerationResult::Failure(failure) => {
          warn!("Relaying failure: {}", failure);
          failure_response(failure)
        }
    }
}

async fn health(State(state): State<RelayState>) -> Json<HealthBody>
{   let backend_healthy = state.client.is_healthy().await;
    Json(HealthBody
    {   relay: "ok".to_string()
      , backend_healthy
    })
}

async fn models(State(state): State<RelayState>) -> Response
{   match state.client.list_models().await
    {   Ok(models) => Json(ModelsBody { models }).into_response()
      , Err(failure) => failure_response(failure)
    }
}

fn passthrough_response(generation: Generation) -> Response
{   let content_type = HeaderValue::from_str(&generation.content_type)
      .unwrap_or_else(|_| HeaderValue::from_static("application/json"));
    ([(CONTENT_TYPE, content_type)], generation.body).into_response()
}

fn failure_response(failure: Failure) -> Response
{   Json(failure).into_response()
}
