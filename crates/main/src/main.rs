//! 主应用程序入口
//!
//! 启动 Axum Web API 服务与房间生命周期后台任务。

use std::{sync::Arc, time::Duration};

use application::{
    Clock, ConnectionRepository, InMemoryStore, MessageRepository, MessageService,
    MessageServiceDependencies, PresenceRegistry, RoomHub, RoomHubDependencies,
    RoomLifecycleDependencies, RoomLifecycleManager, RoomMemberRepository, RoomRepository,
    RoomService, RoomServiceDependencies, SystemClock,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgStorage, MIGRATOR};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

/// 各存储接口的具体实现
struct Repositories {
    rooms: Arc<dyn RoomRepository>,
    members: Arc<dyn RoomMemberRepository>,
    messages: Arc<dyn MessageRepository>,
    connections: Arc<dyn ConnectionRepository>,
}

async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    if config.database.in_memory {
        tracing::warn!("使用进程内存储，重启后数据丢失");
        let store = Arc::new(InMemoryStore::new());
        return Ok(Repositories {
            rooms: store.clone(),
            members: store.clone(),
            messages: store.clone(),
            connections: store,
        });
    }

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    MIGRATOR.run(&pg_pool).await?;
    tracing::info!("数据库迁移完成");

    let storage = PgStorage::new(pg_pool);
    Ok(Repositories {
        rooms: storage.room_repository,
        members: storage.member_repository,
        messages: storage.message_repository,
        connections: storage.connection_repository,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let repositories = build_repositories(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let presence = Arc::new(PresenceRegistry::new());
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    // 创建应用层服务
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        room_repository: repositories.rooms.clone(),
        member_repository: repositories.members.clone(),
        message_repository: repositories.messages.clone(),
        clock: clock.clone(),
    }));
    let room_service = Arc::new(RoomService::new(RoomServiceDependencies {
        room_repository: repositories.rooms.clone(),
        member_repository: repositories.members.clone(),
        clock: clock.clone(),
    }));
    let hub = Arc::new(RoomHub::new(RoomHubDependencies {
        room_repository: repositories.rooms.clone(),
        member_repository: repositories.members.clone(),
        connection_repository: repositories.connections.clone(),
        message_service: message_service.clone(),
        presence: presence.clone(),
        token_verifier: jwt_service.clone(),
        clock: clock.clone(),
    }));

    // 启动过期房间清理任务
    let shutdown = CancellationToken::new();
    let lifecycle = Arc::new(RoomLifecycleManager::new(
        RoomLifecycleDependencies {
            room_repository: repositories.rooms.clone(),
            connection_repository: repositories.connections.clone(),
            hub: hub.clone(),
            presence,
            clock,
        },
        Duration::from_secs(config.lifecycle.sweep_interval_secs),
    ));
    let lifecycle_task = tokio::spawn(lifecycle.run(shutdown.clone()));

    let state = AppState::new(hub, room_service, message_service, jwt_service);
    let app = router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("聊天室服务器启动在 http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = lifecycle_task.await {
        tracing::warn!(error = %err, "房间生命周期任务异常退出");
    }
    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
    shutdown.cancel();
}
