use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ollama_relay::relay;
use ollama_relay::
{   BackendConfig
  , Failure
  , FailureKind
  , GenerationClient
  , GenerationOptions
  , GenerationResult
  , ModelTag
  , OllamaClient
  , RelayCaller
  , SharedClient
};

const HELLO_REPLY: &str
  = r#"{"model":"gemma3n","created_at":"2025-01-01T00:00:00Z","response":"Hi there!","done":true}"#;

// ===== Fixtures =====

fn client_for(base_url: &str) -> OllamaClient
{   let config = BackendConfig
    {   base_url: base_url.to_string()
      , health_timeout_secs: 1
      , ..BackendConfig::default()
    };
    OllamaClient::new(&config).expect("client should build")
}

/// URL of a port nothing listens on
fn closed_port_url() -> String
{   let listener = std::net::TcpListener::bind("127.0.0.1:0")
      .expect("bind probe port");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{}", addr)
}

/// Backend that accepts connections and never answers
async fn silent_backend_url() -> String
{   let listener = TcpListener::bind("127.0.0.1:0")
      .await
      .expect("bind silent backend");
    let addr = listener.local_addr().expect("silent addr");
    tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await
      {   held.push(socket);
      }
    });
    format!("http://{}", addr)
}

async fn spawn_relay(client: SharedClient) -> String
{   let listener = TcpListener::bind("127.0.0.1:0")
      .await
      .expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    tokio::spawn(relay::serve(listener, client));
    format!("http://{}", addr)
}

async fn ask_relay(relay_url: &str, query: &[(&str, &str)])
  -> (u16, Option<String>, String)
{   let response = reqwest::Client::new()
      .get(format!("{}/ask", relay_url))
      .query(query)
      .send()
      .await
      .expect("relay should answer");
    let status = response.status().as_u16();
    let content_type = response.headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string);
    let body = response.text().await.expect("relay body");
    (status, content_type, body)
}

/// Fake backend that counts calls and always answers the same way
struct CountingClient
{   calls: AtomicUsize
  , reply: GenerationResult
}

impl CountingClient
{   fn new(reply: GenerationResult) -> Arc<Self>
    {   Arc::new(CountingClient
        {   calls: AtomicUsize::new(0)
          , reply
        })
    }

    fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for CountingClient
{   fn backend_name(&self) -> &str
    {   "counting"
    }

    async fn generate(
      &self
    , _prompt: &str
    , _options: GenerationOptions
    ) -> GenerationResult
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    async fn is_healthy(&self) -> bool
    {   true
    }
}

// ===== Generation Client =====

#[tokio::test]
async fn test_generate_returns_backend_text()
{   let mut server = Server::new_async().await;
    let mock = server
      .mock("POST", "/api/generate")
      .match_body(Matcher::PartialJson(json!({
        "prompt": "Hello",
        "model": "gemma3n",
        "stream": false
      })))
      .with_status(200)
      .with_header("content-type", "application/json; charset=utf-8")
      .with_body(HELLO_REPLY)
      .create_async()
      .await;

    let client = client_for(&server.url());
    let result = client
      .generate("Hello", GenerationOptions::default())
      .await;

    mock.assert_async().await;
    let generation = result.into_result().expect("should succeed");
    assert_eq!(generation.text.as_deref(), Some("Hi there!"));
    assert_eq!(generation.body, HELLO_REPLY);
    assert_eq!(generation.metadata["done"], json!(true));
    assert_eq!(
      generation.content_type,
      "application/json; charset=utf-8"
    );
}

#[tokio::test]
async fn test_generate_forwards_overrides_and_extras()
{   let mut server = Server::new_async().await;
    let mock = server
      .mock("POST", "/api/generate")
      .match_body(Matcher::PartialJson(json!({
        "prompt": "Tell me a fun fact about space",
        "model": "llama3",
        "stream": false,
        "options": {"temperature": 0.1},
        "system": "be brief"
      })))
      .with_status(200)
      .with_body(r#"{"response":"Venus spins backwards."}"#)
      .create_async()
      .await;

    let options = GenerationOptions::default()
      .with_model("llama3")
      .with_extra("options", json!({"temperature": 0.1}))
      .with_extra("system", json!("be brief"));
    let result = client_for(&server.url())
      .generate("Tell me a fun fact about space", options)
      .await;

    mock.assert_async().await;
    assert!(result.is_success());
}

#[tokio::test]
async fn test_generate_maps_http_error_to_backend_error()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/generate")
      .with_status(404)
      .with_body(r#"{"error":"model 'gemma3n' not found"}"#)
      .create_async()
      .await;

    let result = client_for(&server.url())
      .generate("Hello", GenerationOptions::default())
      .await;

    let failure = result.into_result().expect_err("404 should fail");
    assert_eq!(failure.kind, FailureKind::BackendError);
    assert!(failure.message.contains("model 'gemma3n' not found"));
}

#[tokio::test]
async fn test_generate_rejects_malformed_payload()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body("<html>not json</html>")
      .create_async()
      .await;

    let failure = client_for(&server.url())
      .generate("Hello", GenerationOptions::default())
      .await
      .into_result()
      .expect_err("non-json body should fail");
    assert_eq!(failure.kind, FailureKind::BackendError);
}

#[tokio::test]
async fn test_generate_accepts_json_without_response_field()
{   let chat_shaped
      = r#"{"model":"gemma3n","message":{"role":"assistant","content":"Hi"},"done":true}"#;
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(chat_shaped)
      .create_async()
      .await;

    let generation = client_for(&server.url())
      .generate("Hello", GenerationOptions::default())
      .await
      .into_result()
      .expect("any 2xx json body should succeed");

    assert_eq!(generation.text, None);
    assert_eq!(generation.body, chat_shaped);
    assert_eq!(generation.metadata["message"]["content"], json!("Hi"));
    assert_eq!(generation.metadata["done"], json!(true));

    let relay_url = spawn_relay(Arc::new(client_for(&server.url()))).await;
    let (status, _, body)
      = ask_relay(&relay_url, &[("prompt", "Hello")]).await;
    assert_eq!(status, 200);
    assert_eq!(body, chat_shaped);
}

#[tokio::test]
async fn test_generate_unreachable_backend_is_unavailable()
{   let client = client_for(&closed_port_url());
    let failure = client
      .generate("Hello", GenerationOptions::default())
      .await
      .into_result()
      .expect_err("closed port should fail");

    assert_eq!(failure.kind, FailureKind::BackendUnavailable);
    assert!(failure.message.contains("unavailable"));
}

#[tokio::test]
async fn test_generate_times_out_within_window()
{   let client = client_for(&silent_backend_url().await);
    let options = GenerationOptions::default()
      .with_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let failure = client
      .generate("Hello", options)
      .await
      .into_result()
      .expect_err("silent backend should time out");

    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_generate_empty_prompt_makes_no_call()
{   let mut server = Server::new_async().await;
    let mock = server
      .mock("POST", "/api/generate")
      .expect(0)
      .create_async()
      .await;

    let failure = client_for(&server.url())
      .generate("  ", GenerationOptions::default())
      .await
      .into_result()
      .expect_err("blank prompt should fail");

    mock.assert_async().await;
    assert_eq!(failure.kind, FailureKind::ClientInput);
}

#[tokio::test]
async fn test_is_healthy_only_on_200()
{   let mut server = Server::new_async().await;
    let ok = server
      .mock("GET", "/api/tags")
      .with_status(200)
      .with_body(r#"{"models":[]}"#)
      .create_async()
      .await;
    let client = client_for(&server.url());
    assert!(client.is_healthy().await);
    ok.assert_async().await;
    ok.remove_async().await;

    let down = server
      .mock("GET", "/api/tags")
      .with_status(503)
      .create_async()
      .await;
    assert!(!client.is_healthy().await);
    down.remove_async().await;

    let _no_content = server
      .mock("GET", "/api/tags")
      .with_status(204)
      .create_async()
      .await;
    assert!(!client.is_healthy().await);

    assert!(!client_for(&closed_port_url()).is_healthy().await);
}

#[tokio::test]
async fn test_is_healthy_false_on_probe_timeout()
{   let client = client_for(&silent_backend_url().await);
    let started = Instant::now();
    assert!(!client.is_healthy().await);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_list_models_parses_tags()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/tags")
      .with_status(200)
      .with_body(r#"{"models":[
        {"name":"gemma3n:latest","model":"gemma3n:latest","size":7547589116,
         "digest":"abc","details":{"family":"gemma3n"}},
        {"name":"llama3:8b"}
      ]}"#)
      .create_async()
      .await;

    let models = client_for(&server.url())
      .list_models()
      .await
      .expect("tags should parse");

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "gemma3n:latest");
    assert_eq!(models[0].size, Some(7547589116));
    assert_eq!(models[1].digest, None);
}

#[tokio::test]
async fn test_list_models_unreachable_is_failure()
{   let failure = client_for(&closed_port_url())
      .list_models()
      .await
      .expect_err("closed port should fail");
    assert_eq!(failure.kind, FailureKind::BackendUnavailable);
}

// ===== Relay Endpoint =====

#[tokio::test]
async fn test_relay_root_is_static()
{   let fake = CountingClient::new(GenerationResult::Failure(
      Failure::new(FailureKind::BackendError, "unused")
    ));
    let relay_url = spawn_relay(fake.clone()).await;

    let body: Value = reqwest::get(format!("{}/", relay_url))
      .await
      .expect("root should answer")
      .json()
      .await
      .expect("root body is json");

    assert_eq!(body, json!({"message": relay::WELCOME_MESSAGE}));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn test_relay_passes_backend_body_through()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/generate")
      .match_body(Matcher::PartialJson(json!({"prompt": "Hello"})))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(HELLO_REPLY)
      .create_async()
      .await;

    let relay_url = spawn_relay(Arc::new(client_for(&server.url()))).await;
    let (status, content_type, body)
      = ask_relay(&relay_url, &[("prompt", "Hello")]).await;

    assert_eq!(status, 200);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body, HELLO_REPLY);
    assert!(body.contains("Hi there!"));
}

#[tokio::test]
async fn test_relay_reports_unreachable_backend_as_error_body()
{   let relay_url = spawn_relay(
      Arc::new(client_for(&closed_port_url()))
    ).await;

    for _ in 0..2
    {   let (status, _, body)
          = ask_relay(&relay_url, &[("prompt", "Hello")]).await;
        assert_eq!(status, 200);

        let failure: Failure = serde_json::from_str(&body)
          .expect("error body should parse");
        assert_eq!(failure.kind, FailureKind::BackendUnavailable);
        assert!(failure.message.contains("unavailable"));
        assert!(!failure.success);
    }
}

#[tokio::test]
async fn test_relay_missing_prompt_skips_backend()
{   let fake = CountingClient::new(GenerationResult::Failure(
      Failure::new(FailureKind::BackendError, "should not be called")
    ));
    let relay_url = spawn_relay(fake.clone()).await;

    for query in [&[][..], &[("prompt", "")][..]]
    {   let (status, _, body) = ask_relay(&relay_url, query).await;
        assert_eq!(status, 200);
        let failure: Failure = serde_json::from_str(&body)
          .expect("error body should parse");
        assert_eq!(failure.kind, FailureKind::ClientInput);
        assert!(failure.message.contains("prompt"));
    }

    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn test_relay_rejected_query_is_error_body()
{   let fake = CountingClient::new(GenerationResult::Failure(
      Failure::new(FailureKind::BackendError, "should not be called")
    ));
    let relay_url = spawn_relay(fake.clone()).await;

    let (status, content_type, body) = ask_relay(
      &relay_url,
      &[("prompt", "a"), ("prompt", "b")]
    ).await;

    assert_eq!(status, 200);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let failure: Failure = serde_json::from_str(&body)
      .expect("error body should parse");
    assert_eq!(failure.kind, FailureKind::ClientInput);
    assert!(!failure.message.is_empty());
    assert!(!failure.success);
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn test_relay_health_and_models()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/tags")
      .with_status(200)
      .with_body(r#"{"models":[{"name":"gemma3n:latest"}]}"#)
      .create_async()
      .await;
    let relay_url = spawn_relay(Arc::new(client_for(&server.url()))).await;

    let health: Value = reqwest::get(format!("{}/health", relay_url))
      .await
      .expect("health should answer")
      .json()
      .await
      .expect("health body is json");
    assert_eq!(health, json!({"relay": "ok", "backend_healthy": true}));

    let models: Value = reqwest::get(format!("{}/models", relay_url))
      .await
      .expect("models should answer")
      .json()
      .await
      .expect("models body is json");
    let listed: Vec<ModelTag> = serde_json::from_value(
      models["models"].clone()
    ).expect("model list should parse");
    assert_eq!(listed[0].name, "gemma3n:latest");
}

#[tokio::test]
async fn test_relay_models_without_listing_support()
{   let fake = CountingClient::new(GenerationResult::Failure(
      Failure::new(FailureKind::BackendError, "unused")
    ));
    let relay_url = spawn_relay(fake).await;

    let failure: Failure = reqwest::get(format!("{}/models", relay_url))
      .await
      .expect("models should answer")
      .json()
      .await
      .expect("failure body is json");
    assert_eq!(failure.kind, FailureKind::BackendError);
    assert!(failure.message.contains("counting"));
}

// ===== Caller =====

#[tokio::test]
async fn test_caller_renders_relay_answers()
{   let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(HELLO_REPLY)
      .create_async()
      .await;
    let relay_url = spawn_relay(Arc::new(client_for(&server.url()))).await;

    let caller = RelayCaller::new(relay_url.as_str())
      .expect("caller should build");
    assert!(caller.is_relay_up().await);
    assert_eq!(caller.ask("Hello").await, "Hi there!");

    let down = spawn_relay(Arc::new(client_for(&closed_port_url()))).await;
    let answer = RelayCaller::new(down.as_str())
      .expect("caller should build")
      .ask("Hello")
      .await;
    assert!(answer.starts_with("Error: Ollama backend unavailable"));
}

#[tokio::test]
async fn test_caller_without_relay()
{   let caller = RelayCaller::new(closed_port_url())
      .expect("caller should build");
    assert!(!caller.is_relay_up().await);
    assert!(caller.ask("Hello").await.starts_with("Connection Error:"));
}

#[tokio::test]
async fn test_caller_gives_up_after_ask_timeout()
{   let caller = RelayCaller::new(silent_backend_url().await)
      .expect("caller should build")
      .with_ask_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let answer = caller.ask("Hello").await;

    assert!(answer.starts_with("Connection Error:"));
    assert!(started.elapsed() < Duration::from_secs(3));
}
