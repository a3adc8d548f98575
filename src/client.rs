use std::sync::Arc;

use async_trait::async_trait;

use crate::request::
{   Failure
  , FailureKind
  , GenerationOptions
  , GenerationResult
  , ModelTag
};

/// Capability the relay depends on. Implementations fold every
/// transport fault into the returned value; none of these calls
/// may panic or hang past their timeout.
#[async_trait]
pub trait GenerationClient: Send + Sync
{   /// Human-readable backend name, used in logs
    fn backend_name(&self) -> &str;

    /// One generation round trip, no retries
    async fn generate(
      &self
    , prompt: &str
    , options: GenerationOptions
    ) -> GenerationResult;

    /// Fresh liveness probe, never cached
    async fn is_healthy(&self) -> bool;

    /// Models the backend can serve
    async fn list_models(&self) -> Result<Vec<ModelTag>, Failure>
    {   Err(Failure::new(
          FailureKind::BackendError,
          format!("{} does not support model listing", self.backend_name())
        ))
    }
}

/// Client handle injected into the relay at startup
pub type SharedClient = Arc<dyn GenerationClient>;
