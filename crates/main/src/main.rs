//! 主应用程序入口
//!
//! 装配内存适配器与调度器，启动 Axum Web API 服务和输入指示过期扫描。

use std::sync::Arc;

use application::{ChatDispatcher, Clock, InMemoryChatDirectory, InMemoryMessageStore, SystemClock};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    // 装配核心服务
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let message_store = Arc::new(InMemoryMessageStore::new(clock.clone()));
    // 本地开发默认放行所有会话；生产部署替换为真实的成员目录适配器
    let chat_directory = Arc::new(InMemoryChatDirectory::allow_all());
    let dispatcher = Arc::new(ChatDispatcher::new(message_store, clock));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(dispatcher.clone(), jwt_service, chat_directory);

    // 输入指示过期兜底扫描：客户端停止信号丢失时由它收尾
    let stale_after = chrono::Duration::seconds(config.websocket.typing_stale_seconds as i64);
    let sweep_interval = std::time::Duration::from_secs(config.websocket.typing_sweep_seconds);
    let sweeper = dispatcher.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let swept = sweeper.sweep_stale_typing(stale_after).await;
            if swept > 0 {
                tracing::info!(swept, "expired stale typing indicators");
            }
        }
    });

    // 启动 Web 服务器
    let app = router(state);
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;

    tracing::info!(
        "聊天服务启动在 http://{}:{}",
        config.server.host,
        config.server.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
