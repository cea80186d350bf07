use crate::error::RelayError;
use crate::metrics;
use crate::server::AppState;
use crate::session::token::find_session_token;
use crate::session::SessionId;
use crate::types::{ActiveProviders, ChatReply, ChatRequest, ErrorBody, MessageBody, SetApiKeyRequest};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

// 统一的 Body 类型
type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, BoxError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => health_check(),
        (&Method::GET, "/metrics") => metrics_endpoint(),
        (&Method::GET, "/") => {
            let session = SessionContext::resolve(req.headers(), &state);
            session.finish(index_page())
        }
        (&Method::GET, "/active-providers") => {
            let session = SessionContext::resolve(req.headers(), &state);
            let response = active_providers(&state, &session.id);
            session.finish(response)
        }
        (&Method::POST, "/set-api-key") => {
            let session = SessionContext::resolve(req.headers(), &state);
            let response = set_api_key(req, &state, &session.id).await;
            session.finish(response)
        }
        (&Method::POST, "/chat") => {
            let session = SessionContext::resolve(req.headers(), &state);
            let response = chat(req, &state, &session.id).await;
            session.finish(response)
        }
        _ => not_found(),
    };

    debug!(method = %method, path = %path, status = response.status().as_u16(), "请求完成");
    Ok(response)
}

/// 当前请求的会话，新会话需要下发 cookie
struct SessionContext {
    id: SessionId,
    set_cookie: Option<String>,
}

impl SessionContext {
    fn resolve(headers: &HeaderMap, state: &AppState) -> Self {
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(find_session_token)
            .find_map(|token| state.signer.verify(token));

        match existing {
            Some(id) => Self {
                id,
                set_cookie: None,
            },
            None => {
                let id = SessionId::generate();
                let set_cookie = Some(state.signer.cookie_header(&id));
                debug!("创建新会话");
                Self { id, set_cookie }
            }
        }
    }

    fn finish(self, mut response: Response<BoxBody>) -> Response<BoxBody> {
        if let Some(cookie) = self.set_cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().insert(SET_COOKIE, value);
                }
                Err(e) => warn!("无法写入会话 cookie: {}", e),
            }
        }
        response
    }
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|e| Box::new(e) as BoxError)
        .boxed()
}

fn text_response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<BoxBody> {
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    match serde_json::to_vec(body) {
        Ok(bytes) => text_response(status, "application/json", bytes),
        Err(e) => {
            warn!("序列化响应失败: {}", e);
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
                r#"{"error":"An unexpected error occurred"}"#,
            )
        }
    }
}

fn error_response(err: &RelayError) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &ErrorBody {
            error: err.public_message(),
        },
    )
}

/// 读取并解析 JSON 请求体，大小受限
async fn read_json<T: DeserializeOwned>(req: Request<Incoming>, max_bytes: usize) -> crate::Result<T> {
    let body = Limited::new(req.into_body(), max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                RelayError::input("Request body too large")
            } else {
                RelayError::input("No data received")
            }
        })?
        .to_bytes();

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::input("No data received"));
    }
    serde_json::from_slice(&body).map_err(|_| RelayError::input("Invalid JSON body"))
}

/// 健康检查端点
fn health_check() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "status": "ok",
            "service": "chatrelay"
        }),
    )
}

/// 指标端点
fn metrics_endpoint() -> Response<BoxBody> {
    let body = metrics::global_metrics().export_prometheus();
    text_response(StatusCode::OK, "text/plain; version=0.0.4", body)
}

fn index_page() -> Response<BoxBody> {
    text_response(StatusCode::OK, "text/html; charset=utf-8", INDEX_HTML)
}

fn active_providers(state: &AppState, session: &SessionId) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &ActiveProviders {
            active_providers: state.sessions.list_active(session),
        },
    )
}

async fn set_api_key(req: Request<Incoming>, state: &AppState, session: &SessionId) -> Response<BoxBody> {
    let result = async {
        let body: SetApiKeyRequest = read_json(req, state.config.server.max_body_bytes).await?;
        let provider = body.provider.unwrap_or_default();
        let api_key = body.api_key.unwrap_or_default();
        state.sessions.set(session, &provider, &api_key)?;
        Ok::<_, RelayError>(provider.trim().to_string())
    }
    .await;

    match result {
        Ok(provider) => {
            info!(provider = %provider, "已保存会话 API 密钥");
            json_response(
                StatusCode::OK,
                &MessageBody {
                    message: format!("{} API key set successfully", provider),
                },
            )
        }
        Err(e) => {
            warn!(error = %e, "保存 API 密钥失败");
            error_response(&e)
        }
    }
}

/// 聊天端点：单轮转发，不保留历史
async fn chat(req: Request<Incoming>, state: &AppState, session: &SessionId) -> Response<BoxBody> {
    let metrics = metrics::global_metrics();

    let result = async {
        let body: ChatRequest = read_json(req, state.config.server.max_body_bytes).await?;
        let message = body.message.unwrap_or_default();
        // 缺省或空白的 provider 使用默认值
        let provider = body
            .provider
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| state.default_provider.as_str().to_string());
        debug!(provider = %provider, message_len = message.len(), "收到聊天请求");

        state
            .dispatcher
            .relay(&state.sessions, session, &provider, &message)
            .await
    }
    .await;

    match result {
        Ok((provider, reply)) => {
            metrics.record_success(provider);
            json_response(StatusCode::OK, &ChatReply { reply })
        }
        Err(e) => {
            match &e {
                RelayError::ProviderCallFailed { provider, .. } => metrics.record_failure(*provider),
                _ => metrics.record_rejected(),
            }
            warn!(status = e.status_code().as_u16(), error = %e, "聊天请求失败");
            error_response(&e)
        }
    }
}

/// 404 响应
fn not_found() -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            error: "Not Found".to_string(),
        },
    )
}
