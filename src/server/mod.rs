pub mod handlers;

use crate::config::Config;
use crate::providers::routing::Dispatcher;
use crate::providers::ProviderKind;
use crate::session::token::SessionSigner;
use crate::session::SessionStore;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 关闭时等待现有连接的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 请求处理器共享的状态
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub dispatcher: Dispatcher,
    pub signer: SessionSigner,
    pub default_provider: ProviderKind,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let default_provider = config.server.default_provider()?;
        let signer = SessionSigner::new(config.server.resolve_session_secret());
        let sessions = SessionStore::new(config.server.session_ttl());
        let dispatcher = Dispatcher::new(&config)?;

        Ok(Self {
            config,
            sessions,
            dispatcher,
            signer,
            default_provider,
        })
    }
}

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(config: Config, addr: SocketAddr) -> Result<()> {
    let state = Arc::new(AppState::new(config)?);
    let listener = TcpListener::bind(addr).await?;
    info!("ChatRelay 服务器运行在 http://{}", addr);

    let sweeper = spawn_session_sweeper(Arc::clone(&state));
    serve(listener, state, shutdown_signal()).await;
    sweeper.abort();

    info!("服务器已优雅关闭");
    Ok(())
}

/// 在给定 listener 上处理连接，直到 shutdown 完成
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // 等待新连接
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    handlers::handle_request(req, state)
                });

                let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!("服务连接错误: {}", e);
                    }
                });
            }
            // 等待关闭信号
            _ = &mut shutdown => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }

    drop(listener);

    info!("等待现有连接处理完成...");
    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("等待连接关闭超时，强制退出");
        }
    }
}

/// 定期清理过期会话
fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let period = state.config.server.session_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // 第一次 tick 立即返回
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = state.sessions.purge_expired();
            if purged > 0 {
                info!(purged, remaining = state.sessions.len(), "已清理过期会话");
            }
        }
    })
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("收到 Ctrl+C 信号，开始优雅关闭...");
        }
        _ = terminate => {
            warn!("收到 SIGTERM 信号，开始优雅关闭...");
        }
    }
}
