use async_trait::async_trait;
use domain::{
    Connection, ConnectionId, Message, MessageContent, MessageId, NewMessage, RepositoryError,
    Room, RoomId, RoomMember, Timestamp, UserId,
};

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// 原子地创建房间和创建者的成员关系
    async fn create_with_member(
        &self,
        room: Room,
        creator: RoomMember,
    ) -> Result<Room, RepositoryError>;
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
    /// 删除房间，成员关系和消息一并删除
    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError>;
    async fn list_expired(&self, now: Timestamp) -> Result<Vec<Room>, RepositoryError>;
}

#[async_trait]
pub trait RoomMemberRepository: Send + Sync {
    async fn upsert(&self, member: RoomMember) -> Result<RoomMember, RepositoryError>;
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<RoomMember>, RepositoryError>;
    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError>;
    /// 按加入时间升序返回成员
    async fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomMember>, RepositoryError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RoomMember>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 保存消息并返回分配了 ID 的完整记录
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 仅在消息未删除时替换正文并标记为已编辑；消息不存在或已删除时返回 `None`
    async fn update_content(
        &self,
        id: MessageId,
        content: MessageContent,
    ) -> Result<Option<Message>, RepositoryError>;

    /// 只置位删除标记，不触碰正文；消息不存在时返回 `None`
    async fn mark_deleted(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    // 未删除的消息，按 (created_at, id) 升序分页
    async fn list_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn create(&self, connection: Connection) -> Result<Connection, RepositoryError>;
    async fn delete(&self, id: ConnectionId) -> Result<(), RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Connection>, RepositoryError>;
}
