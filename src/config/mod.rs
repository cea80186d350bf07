use crate::error::RelayError;
use crate::providers::ProviderKind;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// 会话密钥环境变量
pub const SESSION_SECRET_ENV: &str = "CHATRELAY_SESSION_SECRET";

/// 未配置密钥时使用的默认值，不安全，仅用于本地开发
const INSECURE_SESSION_SECRET: &str = "chatrelay-insecure-dev-secret";

/// 主配置结构
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// 服务端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub default_provider: String,
    pub request_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub session_sweep_secs: u64,
    pub max_body_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::OpenAi.as_str().to_string(),
            request_timeout_secs: 30,
            session_ttl_secs: 24 * 60 * 60,
            session_sweep_secs: 300,
            max_body_bytes: 64 * 1024,
            session_secret: None,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs)
    }

    /// 默认 provider（validate 之后一定可解析）
    pub fn default_provider(&self) -> Result<ProviderKind> {
        self.default_provider.parse()
    }

    /// 解析会话签名密钥：配置文件 > 环境变量 > 内置不安全默认值
    pub fn resolve_session_secret(&self) -> String {
        if let Some(secret) = self.session_secret.as_ref().filter(|s| !s.is_empty()) {
            return secret.clone();
        }
        match std::env::var(SESSION_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!(
                    "未设置 {}，使用不安全的默认会话密钥，请勿用于生产环境",
                    SESSION_SECRET_ENV
                );
                INSECURE_SESSION_SECRET.to_string()
            }
        }
    }
}

/// 各 provider 的上游配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderEndpoint::openai")]
    pub openai: ProviderEndpoint,
    #[serde(default = "DeepSeekEndpoint::default")]
    pub deepseek: DeepSeekEndpoint,
    #[serde(default = "ProviderEndpoint::gemini")]
    pub gemini: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderEndpoint::openai(),
            deepseek: DeepSeekEndpoint::default(),
            gemini: ProviderEndpoint::gemini(),
        }
    }
}

impl ProvidersConfig {
    /// 配置中省略的地址和模型使用对应 provider 的默认值
    fn fill_defaults(&mut self) {
        self.openai.fill_missing(ProviderEndpoint::openai());
        self.gemini.fill_missing(ProviderEndpoint::gemini());

        let deepseek = DeepSeekEndpoint::default();
        if self.deepseek.api_base.is_empty() {
            self.deepseek.api_base = deepseek.api_base;
        }
        if self.deepseek.model.is_empty() {
            self.deepseek.model = deepseek.model;
        }
    }
}

/// 单个 provider 的上游地址和模型
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderEndpoint {
    pub api_base: String,
    pub model: String,
}

impl ProviderEndpoint {
    fn fill_missing(&mut self, defaults: ProviderEndpoint) {
        if self.api_base.is_empty() {
            self.api_base = defaults.api_base;
        }
        if self.model.is_empty() {
            self.model = defaults.model;
        }
    }

    pub fn openai() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        }
    }

    pub fn gemini() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-pro".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeepSeekEndpoint {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for DeepSeekEndpoint {
    fn default() -> Self {
        Self {
            api_base: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

impl Config {
    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let content = Self::replace_env_vars(&content)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.providers.fill_defaults();
        config.validate()?;
        Ok(config)
    }

    /// 文件存在则加载，否则使用内置默认值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("加载配置文件: {}", path.display());
            Self::from_file(path)
        } else {
            info!("配置文件 {} 不存在，使用默认配置", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// 替换配置中的环境变量 ${VAR}
    fn replace_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| RelayError::internal(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name).map_err(|_| {
                RelayError::config(format!("环境变量未找到: {}", var_name))
            })?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.server.default_provider().is_err() {
            return Err(RelayError::config(format!(
                "default_provider 不是已知的 provider: {}",
                self.server.default_provider
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(RelayError::config("request_timeout_secs 必须大于 0"));
        }
        if self.server.session_ttl_secs == 0 {
            return Err(RelayError::config("session_ttl_secs 必须大于 0"));
        }
        if self.server.session_sweep_secs == 0 {
            return Err(RelayError::config("session_sweep_secs 必须大于 0"));
        }

        let endpoints = [
            ("openai", &self.providers.openai.api_base, &self.providers.openai.model),
            ("deepseek", &self.providers.deepseek.api_base, &self.providers.deepseek.model),
            ("gemini", &self.providers.gemini.api_base, &self.providers.gemini.model),
        ];
        for (name, api_base, model) in endpoints {
            if api_base.is_empty() {
                return Err(RelayError::config(format!("{}.api_base 不能为空", name)));
            }
            if model.is_empty() {
                return Err(RelayError::config(format!("{}.model 不能为空", name)));
            }
        }

        let temperature = self.providers.deepseek.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(RelayError::config(format!(
                "deepseek.temperature 必须在 0.0 到 2.0 之间，当前值: {}",
                temperature
            )));
        }

        Ok(())
    }
}
