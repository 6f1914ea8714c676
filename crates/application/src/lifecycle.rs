//! 房间生命周期管理
//!
//! 后台周期任务：回收过期房间并通知在线成员，
//! 同时清理断开时未能删除的连接记录。

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    error::ApplicationError,
    hub::RoomHub,
    presence::PresenceRegistry,
    repository::{ConnectionRepository, RoomRepository},
};

/// 默认清理周期：10 分钟
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_rooms: usize,
    pub stale_connections: usize,
}

pub struct RoomLifecycleDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub connection_repository: Arc<dyn ConnectionRepository>,
    pub hub: Arc<RoomHub>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoomLifecycleManager {
    deps: RoomLifecycleDependencies,
    interval: Duration,
}

impl RoomLifecycleManager {
    pub fn new(deps: RoomLifecycleDependencies, interval: Duration) -> Self {
        Self { deps, interval }
    }

    /// 按周期执行清理，直到收到取消信号。单次失败只记录日志。
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "房间生命周期任务已启动");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("房间生命周期任务已停止");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::info!(
                                expired_rooms = report.expired_rooms,
                                stale_connections = report.stale_connections,
                                "清理完成"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "清理失败"),
                    }
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, ApplicationError> {
        let now = self.deps.clock.now();
        let mut report = SweepReport::default();

        for room in self.deps.room_repository.list_expired(now).await? {
            match self.deps.room_repository.delete(room.id).await {
                Ok(()) => {
                    let evicted = self.deps.hub.evict_room(room.id);
                    tracing::info!(room_id = %room.id, evicted = evicted.len(), "过期房间已回收");
                    report.expired_rooms += 1;
                }
                Err(err) => {
                    tracing::warn!(room_id = %room.id, error = %err, "删除过期房间失败");
                }
            }
        }

        for connection in self.deps.connection_repository.list_all().await? {
            if self
                .deps
                .presence
                .is_connection_live(connection.connection_id)
            {
                continue;
            }
            self.deps
                .connection_repository
                .delete(connection.connection_id)
                .await?;
            report.stale_connections += 1;
        }

        Ok(report)
    }
}
