use crate::config::ProviderEndpoint;
use crate::error::RelayError;
use crate::providers::{check_status, endpoint_url, Provider};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gemini API 请求格式
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

/// 单条消息不带 role
#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

/// Gemini API 响应格式
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn convert_request(message: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart {
                text: message.to_string(),
            }],
        }],
    }
}

/// 取第一个 candidate 的全部文本
fn extract_text(resp: GeminiResponse) -> Result<String> {
    let block_reason = resp
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let candidate = match resp.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => {
            return Err(RelayError::malformed(match block_reason {
                Some(reason) => format!("prompt blocked: {}", reason),
                None => "response contained no candidates".to_string(),
            }))
        }
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(RelayError::malformed(format!(
            "response contained no text (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

/// Gemini generateContent adapter
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    endpoint: ProviderEndpoint,
}

impl GeminiAdapter {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Provider for GeminiAdapter {
    async fn send(&self, client: &Client, message: &str, api_key: &str) -> Result<String> {
        // API 密钥放在请求头，不出现在 URL 中
        let url = endpoint_url(
            &self.endpoint.api_base,
            &format!("v1beta/models/{}:generateContent", self.endpoint.model),
        );
        debug!(model = %self.endpoint.model, "发送请求到 Gemini");

        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&convert_request(message))
            .send()
            .await?;
        let response = check_status(response).await?;

        let gemini_resp: GeminiResponse = serde_json::from_slice(&response.bytes().await?)?;
        extract_text(gemini_resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    async fn setup_mock_server() -> ServerGuard {
        Server::new_async().await
    }

    fn create_adapter(api_base: &str) -> GeminiAdapter {
        GeminiAdapter::new(ProviderEndpoint {
            api_base: api_base.to_string(),
            model: "gemini-pro".to_string(),
        })
    }

    #[test]
    fn test_convert_request_has_no_role() {
        let json = serde_json::to_value(convert_request("Hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"contents": [{"parts": [{"text": "Hello"}]}]})
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "Hello world");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let resp: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = extract_text(resp).unwrap_err();
        assert!(err.to_string().contains("prompt blocked: SAFETY"));
    }

    #[test]
    fn test_extract_text_empty_candidate() {
        let resp: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        let err = extract_text(resp).unwrap_err();
        assert!(err.to_string().contains("finish reason: SAFETY"));
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .match_header("x-goog-api-key", "test-api-key")
            .match_body(Matcher::Json(serde_json::json!({
                "contents": [{"parts": [{"text": "Hello"}]}]
            })))
            .with_status(200)
            .with_body(
                r#"{
                "candidates": [{
                    "content": {
                        "parts": [{"text": "Hello from Gemini!"}],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 5,
                    "candidatesTokenCount": 10,
                    "totalTokenCount": 15
                }
            }"#,
            )
            .create_async()
            .await;

        let adapter = create_adapter(&server.url());
        let reply = adapter
            .send(&Client::new(), "Hello", "test-api-key")
            .await
            .unwrap();
        assert_eq!(reply, "Hello from Gemini!");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_api_error() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .match_header("x-goog-api-key", "test-api-key")
            .with_status(400)
            .with_body(r#"{"error": {"message": "API key not valid"}}"#)
            .create_async()
            .await;

        let adapter = create_adapter(&server.url());
        let result = adapter.send(&Client::new(), "Hello", "test-api-key").await;
        assert!(matches!(
            result,
            Err(RelayError::UpstreamError { status: 400, .. })
        ));

        mock.assert_async().await;
    }
}
