use crate::providers::ProviderKind;
use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    InputError(String),

    #[error("Please set your {0} API key first")]
    CredentialMissing(ProviderKind),

    #[error("Invalid AI provider selected: {0}")]
    UnsupportedProvider(String),

    #[error("Error communicating with {name}: {detail}", name = .provider.display_name())]
    ProviderCallFailed { provider: ProviderKind, detail: String },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP 请求错误: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("上游 API 错误: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    #[error("上游响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl RelayError {
    pub fn input(msg: impl Into<String>) -> Self {
        RelayError::InputError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RelayError::InternalError(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        RelayError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        RelayError::MalformedResponse(msg.into())
    }

    /// 对外返回的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InputError(_) | RelayError::UnsupportedProvider(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::CredentialMissing(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外返回的错误信息，内部错误不暴露细节
    pub fn public_message(&self) -> String {
        match self {
            RelayError::InputError(_)
            | RelayError::CredentialMissing(_)
            | RelayError::UnsupportedProvider(_)
            | RelayError::ProviderCallFailed { .. } => self.to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// 将 adapter 内部的任意错误收敛为 ProviderCallFailed
    pub fn into_provider_failure(self, provider: ProviderKind) -> Self {
        let detail = match self {
            RelayError::ProviderCallFailed { .. } => return self,
            RelayError::UpstreamError { status, message } => {
                format!("HTTP {}: {}", status, message)
            }
            RelayError::HttpError(e) => e.without_url().to_string(),
            RelayError::JsonError(e) => format!("malformed response: {}", e),
            RelayError::MalformedResponse(msg) => msg,
            other => other.to_string(),
        };
        RelayError::ProviderCallFailed { provider, detail }
    }
}
