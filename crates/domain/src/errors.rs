//! 领域模型错误定义
//!
//! 房间、成员、消息相关的业务规则违反都在这里表达，
//! 存储层失败单独用 [`RepositoryError`] 描述。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 消息正文不合法
    #[error("invalid message content: {reason}")]
    InvalidContent { reason: String },

    #[error("room not found")]
    RoomNotFound,

    /// 用户不是房间成员
    #[error("user is not a member of the room")]
    NotAMember,

    #[error("message not found")]
    MessageNotFound,

    /// 只有发送者本人可以修改或删除消息
    #[error("only the sender may modify this message")]
    NotOwner,

    #[error("message has already been deleted")]
    AlreadyDeleted,

    /// 只有最早加入的成员（创建者）可以解散房间
    #[error("only the room creator may destroy the room")]
    NotRoomCreator,
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 创建消息内容错误
    pub fn invalid_content(reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            reason: reason.into(),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
