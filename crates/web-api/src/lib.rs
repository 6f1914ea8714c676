//! Web API 层。
//!
//! 提供 Axum 路由：REST 接口委托给房间服务与消息服务，
//! `/api/v1/ws` 把 WebSocket 连接交给房间中心。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::{
    router, MemberResponse, MessageResponse, RoomDetailsResponse, RoomResponse,
    RoomSummaryResponse,
};
pub use state::AppState;
