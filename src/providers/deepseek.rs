use crate::config::DeepSeekEndpoint;
use crate::error::RelayError;
use crate::providers::{check_status, endpoint_url, Provider};
use crate::types::{CompletionRequest, CompletionResponse};
use crate::Result;
use reqwest::Client;
use tracing::debug;

/// DeepSeek adapter，OpenAI 兼容协议，额外携带采样参数
#[derive(Debug, Clone)]
pub struct DeepSeekAdapter {
    endpoint: DeepSeekEndpoint,
}

impl DeepSeekAdapter {
    pub fn new(endpoint: DeepSeekEndpoint) -> Self {
        Self { endpoint }
    }

    fn build_request(&self, message: &str) -> CompletionRequest {
        CompletionRequest {
            temperature: Some(self.endpoint.temperature),
            max_tokens: Some(self.endpoint.max_tokens),
            ..CompletionRequest::single_turn(&self.endpoint.model, message)
        }
    }
}

impl Provider for DeepSeekAdapter {
    async fn send(&self, client: &Client, message: &str, api_key: &str) -> Result<String> {
        let url = endpoint_url(&self.endpoint.api_base, "chat/completions");
        debug!(message_len = message.len(), "发送请求到 DeepSeek");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.build_request(message))
            .send()
            .await?;
        let response = check_status(response).await?;

        let completion: CompletionResponse = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(error) = completion.error.as_ref() {
            return Err(RelayError::malformed(format!("provider returned error: {}", error)));
        }
        completion
            .first_content()
            .ok_or_else(|| RelayError::malformed("missing choices[0].message.content"))
    }
}
