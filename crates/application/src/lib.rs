//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：消息服务、房间服务、在线状态注册表、
//! 房间中心（连接网关）以及房间生命周期管理，并定义存储与身份校验的抽象。

pub mod clock;
pub mod error;
pub mod events;
pub mod hub;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod services;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use events::{ClientEvent, OnlineUser, ServerEvent};
pub use hub::{EventReceiver, EventSender, RoomHub, RoomHubDependencies, Session};
pub use identity::{Principal, TokenVerifier};
pub use lifecycle::{
    RoomLifecycleDependencies, RoomLifecycleManager, SweepReport, DEFAULT_SWEEP_INTERVAL,
};
pub use memory::InMemoryStore;
pub use presence::{OfflineOutcome, PresenceRegistry};
pub use repository::{
    ConnectionRepository, MessageRepository, RoomMemberRepository, RoomRepository,
};
pub use services::{
    CreateRoomRequest, MessageService, MessageServiceDependencies, RoomDetails, RoomService,
    RoomServiceDependencies, RoomSummary,
};
