use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::gemini::GeminiClient;
use super::traits::ModelClient;
use crate::app::ApiConfig;
use crate::utils::ModelError;

/// Factory for creating the remote model client from configuration
pub struct ModelFactory;

impl ModelFactory {
    /// Create a Gemini client, reading the API key from the configured environment variable
    pub fn create(api: &ApiConfig) -> Result<Arc<dyn ModelClient>> {
        let api_key = std::env::var(&api.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::MissingApiKey(api.api_key_env.clone()))?;

        Self::create_with_key(api, api_key)
    }

    /// Create a Gemini client with an explicit API key
    pub fn create_with_key(api: &ApiConfig, api_key: String) -> Result<Arc<dyn ModelClient>> {
        debug!(base_url = %api.base_url, timeout_secs = api.timeout_secs, "Creating Gemini client");

        let client = GeminiClient::new(
            api.base_url.clone(),
            api_key,
            Duration::from_secs(api.timeout_secs),
        )?;
        Ok(Arc::new(client))
    }
}
