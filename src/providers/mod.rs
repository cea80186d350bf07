pub mod routing;
pub mod openai;
pub mod deepseek;
pub mod gemini;

use crate::error::RelayError;
use crate::Result;
use reqwest::{Client, Response};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// 上游错误响应体最大保留长度
const MAX_ERROR_BODY_CHARS: usize = 4096;

/// 已知的 provider，顺序即 `/active-providers` 的输出顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::DeepSeek,
        ProviderKind::Gemini,
    ];

    /// 请求中使用的 provider 标签
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Gemini => "Gemini",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ProviderKind::OpenAi => 0,
            ProviderKind::DeepSeek => 1,
            ProviderKind::Gemini => 2,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RelayError::UnsupportedProvider(s.to_string()))
    }
}

/// Provider trait - 每个 adapter 负责一种上游协议的请求/响应转换
#[allow(async_fn_in_trait)]
pub trait Provider {
    /// 发送单轮用户消息，返回回复文本
    async fn send(&self, client: &Client, message: &str, api_key: &str) -> Result<String>;
}

/// 非 2xx 响应转换为 UpstreamError，响应体截断
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect::<String>();
    Err(RelayError::upstream(status.as_u16(), error_body))
}

/// 拼接 `{api_base}/{path}`，容忍 api_base 结尾的斜杠
pub(crate) fn endpoint_url(api_base: &str, path: &str) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), path)
}
