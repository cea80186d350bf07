use crate::providers::ProviderKind;
use serde::{Deserialize, Serialize};

/// `POST /set-api-key` 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetApiKeyRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// `POST /chat` 请求体，provider 缺省时使用配置的默认值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// 统一的成功回复
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub reply: String,
}

/// 统一的错误回复
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// `POST /set-api-key` 成功回复
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageBody {
    pub message: String,
}

/// `GET /active-providers` 回复
#[derive(Debug, Clone, Serialize)]
pub struct ActiveProviders {
    pub active_providers: Vec<ProviderKind>,
}

/// OpenAI 兼容的聊天消息（openai 与 deepseek 共用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    /// 创建用户消息
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI 兼容的 chat completion 请求
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// 单轮请求，只包含一条 user 消息
    pub fn single_turn(model: impl Into<String>, message: &str) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(message)],
            temperature: None,
            max_tokens: None,
        }
    }
}

/// OpenAI 兼容的 chat completion 响应，只保留需要的字段
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    /// 部分兼容实现在 2xx 响应中返回 error 字段
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionResponse {
    /// 第一个 choice 的文本内容
    pub fn first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_without_provider() {
        let req: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(req.message.as_deref(), Some("hi"));
        assert!(req.provider.is_none());
    }

    #[test]
    fn test_set_api_key_request_partial() {
        let req: SetApiKeyRequest = serde_json::from_str(r#"{"provider": "openai"}"#).unwrap();
        assert_eq!(req.provider.as_deref(), Some("openai"));
        assert!(req.api_key.is_none());
    }

    #[test]
    fn test_completion_request_serialization() {
        let req = CompletionRequest::single_turn("gpt-3.5-turbo", "Hello");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "Hello"}]
            })
        );
    }

    #[test]
    fn test_completion_response_first_content() {
        let resp: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(resp.first_content().as_deref(), Some("hi"));

        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(resp.first_content().is_none());

        let resp: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(resp.first_content().is_none());
    }

    #[test]
    fn test_active_providers_serialization() {
        let body = ActiveProviders {
            active_providers: vec![ProviderKind::OpenAi, ProviderKind::Gemini],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"active_providers":["openai","gemini"]}"#);
    }
}
