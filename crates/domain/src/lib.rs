//! 聊天室系统核心领域模型
//!
//! 包含房间、成员关系、消息、连接记录等实体，以及相关的校验规则。

pub mod connection;
pub mod errors;
pub mod message;
pub mod pagination;
pub mod room;
pub mod room_member;
pub mod value_objects;

// 重新导出常用类型
pub use connection::Connection;
pub use errors::{DomainError, RepositoryError};
pub use message::{Message, MessageBody, NewMessage};
pub use pagination::{Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use room::{Room, MAX_ROOM_NAME_LENGTH};
pub use room_member::RoomMember;
pub use value_objects::{
    ConnectionId, MessageContent, MessageId, RoomId, Timestamp, UserId, MAX_MESSAGE_LENGTH,
};
