//! 内存存储实现（用于测试和无数据库运行）
//!
//! 所有表放在同一把锁下，房间删除时的级联与 PostgreSQL 的
//! `ON DELETE CASCADE` 行为一致。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Connection, ConnectionId, Message, MessageContent, MessageId, NewMessage, RepositoryError,
    Room, RoomId, RoomMember, Timestamp, UserId,
};
use tokio::sync::RwLock;

use crate::repository::{
    ConnectionRepository, MessageRepository, RoomMemberRepository, RoomRepository,
};

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, Room>,
    // 第一个元素是插入序号，用于加入时间相同时的排序
    members: HashMap<(RoomId, UserId), (u64, RoomMember)>,
    messages: HashMap<MessageId, Message>,
    connections: HashMap<ConnectionId, Connection>,
    next_member_seq: u64,
    next_message_id: i64,
}

impl Tables {
    fn insert_member(&mut self, member: RoomMember) -> RoomMember {
        let key = (member.room_id, member.user_id);
        if let Some((_, existing)) = self.members.get(&key) {
            return existing.clone();
        }
        self.next_member_seq += 1;
        self.members
            .insert(key, (self.next_member_seq, member.clone()));
        member
    }

    fn sorted_members(&self, filter: impl Fn(&RoomMember) -> bool) -> Vec<RoomMember> {
        let mut rows: Vec<&(u64, RoomMember)> = self
            .members
            .values()
            .filter(|(_, member)| filter(member))
            .collect();
        rows.sort_by(|(a_seq, a), (b_seq, b)| {
            a.joined_at.cmp(&b.joined_at).then(a_seq.cmp(b_seq))
        });
        rows.into_iter().map(|(_, member)| member.clone()).collect()
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryStore {
    async fn create_with_member(
        &self,
        room: Room,
        creator: RoomMember,
    ) -> Result<Room, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.rooms.insert(room.id, room.clone());
        tables.insert_member(creator);
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.tables.read().await.rooms.get(&id).cloned())
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.rooms.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        tables.members.retain(|(room_id, _), _| *room_id != id);
        tables.messages.retain(|_, message| message.room_id != id);
        Ok(())
    }

    async fn list_expired(&self, now: Timestamp) -> Result<Vec<Room>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rooms
            .values()
            .filter(|room| room.is_expired(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoomMemberRepository for InMemoryStore {
    async fn upsert(&self, member: RoomMember) -> Result<RoomMember, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&member.room_id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(tables.insert_member(member))
    }

    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<RoomMember>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .get(&(room_id, user_id))
            .map(|(_, member)| member.clone()))
    }

    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.members.remove(&(room_id, user_id));
        Ok(())
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomMember>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.sorted_members(move |member| member.room_id == room_id))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RoomMember>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.sorted_members(move |member| member.user_id == user_id))
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&message.room_id) {
            return Err(RepositoryError::NotFound);
        }
        tables.next_message_id += 1;
        let id = MessageId::new(tables.next_message_id);
        let stored = Message::from_new(id, message);
        tables.messages.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: MessageContent,
    ) -> Result<Option<Message>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(slot) = tables.messages.get_mut(&id) else {
            return Ok(None);
        };
        // 与删除在同一把写锁下判断，删除之后的编辑不会生效
        if slot.edit(content).is_err() {
            return Ok(None);
        }
        Ok(Some(slot.clone()))
    }

    async fn mark_deleted(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.messages.get_mut(&id).map(|slot| {
            slot.mark_deleted();
            slot.clone()
        }))
    }

    async fn list_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut visible: Vec<&Message> = tables
            .messages
            .values()
            .filter(|message| message.room_id == room_id && !message.is_deleted)
            .collect();
        visible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(visible
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryStore {
    async fn create(&self, connection: Connection) -> Result<Connection, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.connections.contains_key(&connection.connection_id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .connections
            .insert(connection.connection_id, connection.clone());
        Ok(connection)
    }

    async fn delete(&self, id: ConnectionId) -> Result<(), RepositoryError> {
        self.tables.write().await.connections.remove(&id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Connection>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .connections
            .values()
            .cloned()
            .collect())
    }
}
