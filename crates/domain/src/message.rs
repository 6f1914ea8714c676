use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 尚未持久化的消息，ID 由存储层分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// 软删除后仍保留在存储中，但不再对客户端可见
    pub content: MessageContent,
    pub created_at: Timestamp,
    pub is_edited: bool,
    pub is_deleted: bool,
}

/// 面向客户端的消息正文状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Active(String),
    Edited(String),
    Deleted,
}

impl MessageBody {
    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Active(text) | MessageBody::Edited(text) => Some(text),
            MessageBody::Deleted => None,
        }
    }

    pub fn into_content(self) -> Option<String> {
        match self {
            MessageBody::Active(text) | MessageBody::Edited(text) => Some(text),
            MessageBody::Deleted => None,
        }
    }
}

impl Message {
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            room_id: new.room_id,
            sender_id: new.sender_id,
            content: new.content,
            created_at: new.created_at,
            is_edited: false,
            is_deleted: false,
        }
    }

    pub fn edit(&mut self, new_content: MessageContent) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::AlreadyDeleted);
        }
        self.content = new_content;
        self.is_edited = true;
        Ok(())
    }

    /// 标记删除，返回本次调用是否改变了状态。
    pub fn mark_deleted(&mut self) -> bool {
        let changed = !self.is_deleted;
        self.is_deleted = true;
        changed
    }

    pub fn is_sent_by(&self, user_id: UserId) -> bool {
        self.sender_id == user_id
    }

    pub fn body(&self) -> MessageBody {
        if self.is_deleted {
            MessageBody::Deleted
        } else if self.is_edited {
            MessageBody::Edited(self.content.as_str().to_owned())
        } else {
            MessageBody::Active(self.content.as_str().to_owned())
        }
    }
}
