use std::sync::Arc;

use domain::{
    DomainError, Message, MessageContent, MessageId, NewMessage, Pagination, RoomId, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{MessageRepository, RoomMemberRepository, RoomRepository},
};

pub struct MessageServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub member_repository: Arc<dyn RoomMemberRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
}

/// 消息的校验与持久化。
///
/// 不负责广播，调用方在持久化成功后自行分发。
pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: String,
    ) -> Result<Message, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        self.deps
            .member_repository
            .find(room_id, sender_id)
            .await?
            .ok_or(DomainError::NotAMember)?;

        let content = MessageContent::new(content)?;
        let stored = self
            .deps
            .message_repository
            .create(NewMessage {
                room_id,
                sender_id,
                content,
                created_at: self.deps.clock.now(),
            })
            .await?;

        tracing::debug!(room_id = %room_id, message_id = %stored.id, "消息已保存");
        Ok(stored)
    }

    /// 编辑正文。写入是条件更新，与并发删除竞争时以删除为准。
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        user_id: UserId,
        new_content: String,
    ) -> Result<Message, ApplicationError> {
        let message = self.get_message(message_id).await?;
        if !message.is_sent_by(user_id) {
            return Err(DomainError::NotOwner.into());
        }
        if message.is_deleted {
            return Err(DomainError::AlreadyDeleted.into());
        }

        let content = MessageContent::new(new_content)?;
        match self
            .deps
            .message_repository
            .update_content(message_id, content)
            .await?
        {
            Some(updated) => Ok(updated),
            // 读取之后被删除，或随房间一起消失
            None => match self.deps.message_repository.find_by_id(message_id).await? {
                Some(_) => Err(DomainError::AlreadyDeleted.into()),
                None => Err(DomainError::MessageNotFound.into()),
            },
        }
    }

    /// 软删除；重复删除直接返回当前状态，不再写入。
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<Message, ApplicationError> {
        let message = self.get_message(message_id).await?;
        if !message.is_sent_by(user_id) {
            return Err(DomainError::NotOwner.into());
        }
        if message.is_deleted {
            return Ok(message);
        }
        self.deps
            .message_repository
            .mark_deleted(message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    pub async fn get_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    /// 房间历史，未删除的消息按创建顺序从旧到新，页码从 1 开始。
    pub async fn get_room_messages(
        &self,
        room_id: RoomId,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        let pagination = Pagination::new(page, page_size);
        let items = self
            .deps
            .message_repository
            .list_page(room_id, pagination.offset(), pagination.limit())
            .await?;
        Ok(items)
    }
}
