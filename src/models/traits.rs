use async_trait::async_trait;

use super::types::{ChatMessage, FragmentStream};
use crate::utils::ModelError;

/// Client for a remote model service
///
/// The service is stateless from our side: every call carries the full history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the conversation and wait for the complete reply text
    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String, ModelError>;

    /// Send the conversation and receive the reply as ordered text fragments
    async fn generate_stream(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, ModelError>;
}
