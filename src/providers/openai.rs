use crate::config::ProviderEndpoint;
use crate::error::RelayError;
use crate::providers::{check_status, endpoint_url, Provider};
use crate::types::{CompletionRequest, CompletionResponse};
use crate::Result;
use reqwest::Client;
use tracing::debug;

/// OpenAI chat completions adapter
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    endpoint: ProviderEndpoint,
}

impl OpenAiAdapter {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Provider for OpenAiAdapter {
    async fn send(&self, client: &Client, message: &str, api_key: &str) -> Result<String> {
        let url = endpoint_url(&self.endpoint.api_base, "chat/completions");
        let body = CompletionRequest::single_turn(&self.endpoint.model, message);
        debug!(model = %self.endpoint.model, "发送请求到 OpenAI");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let completion: CompletionResponse = serde_json::from_slice(&response.bytes().await?)?;
        completion
            .first_content()
            .ok_or_else(|| RelayError::malformed("response contained no completion choice"))
    }
}
