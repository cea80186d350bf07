use crate::config::Config;
use crate::error::RelayError;
use crate::providers::deepseek::DeepSeekAdapter;
use crate::providers::gemini::GeminiAdapter;
use crate::providers::openai::OpenAiAdapter;
use crate::providers::{Provider, ProviderKind};
use crate::session::{SessionId, SessionStore};
use crate::Result;
use reqwest::Client;
use tracing::{info, warn};

/// 按 provider 名选择 adapter，并统一错误边界
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    openai: OpenAiAdapter,
    deepseek: DeepSeekAdapter,
    gemini: GeminiAdapter,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.server.request_timeout())
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            openai: OpenAiAdapter::new(config.providers.openai.clone()),
            deepseek: DeepSeekAdapter::new(config.providers.deepseek.clone()),
            gemini: GeminiAdapter::new(config.providers.gemini.clone()),
        })
    }

    /// 转发一条消息。adapter 的任何错误都转换为 ProviderCallFailed，不重试
    pub async fn send(&self, provider: ProviderKind, message: &str, api_key: &str) -> Result<String> {
        if message.is_empty() {
            return Err(RelayError::input("No message provided"));
        }

        let result = match provider {
            ProviderKind::OpenAi => self.openai.send(&self.client, message, api_key).await,
            ProviderKind::DeepSeek => self.deepseek.send(&self.client, message, api_key).await,
            ProviderKind::Gemini => self.gemini.send(&self.client, message, api_key).await,
        };

        match result {
            Ok(reply) => {
                info!(provider = %provider, "上游调用成功");
                Ok(reply)
            }
            Err(e) => {
                let err = e.into_provider_failure(provider);
                warn!(provider = %provider, error = %err, "上游调用失败");
                Err(err)
            }
        }
    }

    /// 完整的单轮转发：校验消息 → 解析 provider → 查找会话密钥 → 调用上游
    pub async fn relay(
        &self,
        store: &SessionStore,
        session: &SessionId,
        provider: &str,
        message: &str,
    ) -> Result<(ProviderKind, String)> {
        if message.is_empty() {
            return Err(RelayError::input("No message provided"));
        }
        let kind: ProviderKind = provider.parse()?;
        let api_key = store
            .get(session, kind.as_str())
            .ok_or(RelayError::CredentialMissing(kind))?;

        let reply = self.send(kind, message, &api_key).await?;
        Ok((kind, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeepSeekEndpoint, ProviderEndpoint};
    use mockito::{Server, ServerGuard};
    use std::time::Duration;

    async fn setup_mock_server() -> ServerGuard {
        Server::new_async().await
    }

    /// 三个 provider 都指向同一个 mock server
    fn create_dispatcher(api_base: &str) -> Dispatcher {
        let mut config = Config::default();
        config.providers.openai = ProviderEndpoint {
            api_base: api_base.to_string(),
            model: "gpt-3.5-turbo".to_string(),
        };
        config.providers.deepseek = DeepSeekEndpoint {
            api_base: api_base.to_string(),
            ..DeepSeekEndpoint::default()
        };
        config.providers.gemini = ProviderEndpoint {
            api_base: api_base.to_string(),
            model: "gemini-pro".to_string(),
        };
        Dispatcher::new(&config).unwrap()
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_missing_credential_never_calls_upstream() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dispatcher = create_dispatcher(&server.url());
        let store = store();
        let session = SessionId::generate();

        for kind in ProviderKind::ALL {
            let err = dispatcher
                .relay(&store, &session, kind.as_str(), "hello")
                .await
                .unwrap_err();
            match err {
                RelayError::CredentialMissing(missing) => assert_eq!(missing, kind),
                other => panic!("Expected CredentialMissing, got {:?}", other),
            }
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected_before_credential_lookup() {
        let dispatcher = create_dispatcher("http://127.0.0.1:9");
        let store = store();
        let session = SessionId::generate();
        // 即使存储了同名密钥，也不会被使用
        store.set(&session, "gpt-3.5", "some-key").unwrap();

        let err = dispatcher
            .relay(&store, &session, "gpt-3.5", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedProvider(ref p) if p == "gpt-3.5"));
    }

    #[tokio::test]
    async fn test_empty_message_checked_first() {
        let dispatcher = create_dispatcher("http://127.0.0.1:9");
        let store = store();
        let session = SessionId::generate();

        let err = dispatcher
            .relay(&store, &session, "unknown", "")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InputError(_)));
    }

    #[tokio::test]
    async fn test_whitespace_message_is_forwarded() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "messages": [{"role": "user", "content": "   "}]
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"?"}}]}"#)
            .create_async()
            .await;

        let dispatcher = create_dispatcher(&server.url());
        let store = store();
        let session = SessionId::generate();
        store.set(&session, "openai", "sk-test").unwrap();

        let (_, reply) = dispatcher
            .relay(&store, &session, "openai", "   ")
            .await
            .unwrap();
        assert_eq!(reply, "?");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_relay_deepseek_reply() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer ds-key")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"hi"}}]}"#)
            .create_async()
            .await;

        let dispatcher = create_dispatcher(&server.url());
        let store = store();
        let session = SessionId::generate();
        store.set(&session, "deepseek", "ds-key").unwrap();

        let (kind, reply) = dispatcher
            .relay(&store, &session, "deepseek", "hello")
            .await
            .unwrap();
        assert_eq!(kind, ProviderKind::DeepSeek);
        assert_eq!(reply, "hi");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_2xx_becomes_provider_call_failed() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("upstream overloaded")
            .create_async()
            .await;

        let dispatcher = create_dispatcher(&server.url());
        let err = dispatcher
            .send(ProviderKind::OpenAi, "hello", "sk-key")
            .await
            .unwrap_err();

        match err {
            RelayError::ProviderCallFailed { provider, detail } => {
                assert_eq!(provider, ProviderKind::OpenAi);
                assert!(detail.contains("503"));
                assert!(detail.contains("upstream overloaded"));
            }
            other => panic!("Expected ProviderCallFailed, got {:?}", other),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_json_becomes_provider_call_failed() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let dispatcher = create_dispatcher(&server.url());
        let err = dispatcher
            .send(ProviderKind::Gemini, "hello", "g-key")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::ProviderCallFailed {
                provider: ProviderKind::Gemini,
                ..
            }
        ));
        assert_eq!(err.status_code(), hyper::StatusCode::INTERNAL_SERVER_ERROR);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_network_error_becomes_provider_call_failed() {
        // 端口 9 (discard) 通常无人监听，连接会被拒绝
        let dispatcher = create_dispatcher("http://127.0.0.1:9");
        let err = dispatcher
            .send(ProviderKind::DeepSeek, "hello", "ds-key")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::ProviderCallFailed {
                provider: ProviderKind::DeepSeek,
                ..
            }
        ));
    }
}
