use anyhow::Context;
use chatrelay::config::Config;
use chatrelay::server;
use clap::Parser;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "按会话缓存 API 密钥的多 provider 聊天转发服务", long_about = None)]
struct Args {
    /// 配置文件路径，不存在时使用默认配置
    #[arg(short, long, default_value = "chatrelay.yaml")]
    config: String,

    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let config = Config::load_or_default(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config))?;

    // 解析监听地址
    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", args.bind))?;

    // 启动服务器
    server::start_server(config, addr).await?;

    Ok(())
}
