use std::sync::Arc;

use application::repository::{
    ConnectionRepository, MessageRepository, RoomMemberRepository, RoomRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Connection, ConnectionId, Message, MessageContent, MessageId, NewMessage, RepositoryError,
    Room, RoomId, RoomMember, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict;
        }
        // 外键缺失说明引用的房间已不存在
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    is_group: bool,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<RoomRecord> for Room {
    fn from(value: RoomRecord) -> Self {
        Room {
            id: RoomId::from(value.id),
            name: value.name,
            is_group: value.is_group,
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MemberRecord {
    room_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
}

impl From<MemberRecord> for RoomMember {
    fn from(value: MemberRecord) -> Self {
        RoomMember {
            room_id: RoomId::from(value.room_id),
            user_id: UserId::from(value.user_id),
            joined_at: value.joined_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: Uuid,
    sender_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
    is_edited: bool,
    is_deleted: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: UserId::from(value.sender_id),
            content,
            created_at: value.created_at,
            is_edited: value.is_edited,
            is_deleted: value.is_deleted,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConnectionRecord {
    connection_id: Uuid,
    user_id: Uuid,
    connected_at: DateTime<Utc>,
}

impl From<ConnectionRecord> for Connection {
    fn from(value: ConnectionRecord) -> Self {
        Connection {
            connection_id: ConnectionId::from(value.connection_id),
            user_id: UserId::from(value.user_id),
            connected_at: value.connected_at,
        }
    }
}

#[derive(Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn create_with_member(
        &self,
        room: Room,
        creator: RoomMember,
    ) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (id, name, is_group, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, is_group, created_at, expires_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(&room.name)
        .bind(room.is_group)
        .bind(room.created_at)
        .bind(room.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(Uuid::from(creator.room_id))
        .bind(Uuid::from(creator.user_id))
        .bind(creator.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(Room::from(record))
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, is_group, created_at, expires_at FROM rooms WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Room::from))
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_expired(&self, now: Timestamp) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name, is_group, created_at, expires_at
            FROM rooms
            WHERE expires_at IS NOT NULL AND expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Room::from).collect())
    }
}

#[derive(Clone)]
pub struct PgRoomMemberRepository {
    pool: PgPool,
}

impl PgRoomMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomMemberRepository for PgRoomMemberRepository {
    async fn upsert(&self, member: RoomMember) -> Result<RoomMember, RepositoryError> {
        // 冲突时保留原加入时间
        let record = sqlx::query_as::<_, MemberRecord>(
            r#"
            INSERT INTO room_members (room_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id) DO UPDATE SET room_id = EXCLUDED.room_id
            RETURNING room_id, user_id, joined_at
            "#,
        )
        .bind(Uuid::from(member.room_id))
        .bind(Uuid::from(member.user_id))
        .bind(member.joined_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(RoomMember::from(record))
    }

    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<RoomMember>, RepositoryError> {
        let record = sqlx::query_as::<_, MemberRecord>(
            r#"SELECT room_id, user_id, joined_at FROM room_members WHERE room_id = $1 AND user_id = $2"#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(RoomMember::from))
    }

    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(Uuid::from(room_id))
            .bind(Uuid::from(user_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomMember>, RepositoryError> {
        let records = sqlx::query_as::<_, MemberRecord>(
            r#"
            SELECT room_id, user_id, joined_at
            FROM room_members
            WHERE room_id = $1
            ORDER BY joined_at ASC, seq ASC
            "#,
        )
        .bind(Uuid::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(RoomMember::from).collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RoomMember>, RepositoryError> {
        let records = sqlx::query_as::<_, MemberRecord>(
            r#"
            SELECT room_id, user_id, joined_at
            FROM room_members
            WHERE user_id = $1
            ORDER BY joined_at ASC, seq ASC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(RoomMember::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (room_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, room_id, sender_id, content, created_at, is_edited, is_deleted
            "#,
        )
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, created_at, is_edited, is_deleted
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: MessageContent,
    ) -> Result<Option<Message>, RepositoryError> {
        // 条件更新：已删除的行不会被改写
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET content = $2, is_edited = TRUE
            WHERE id = $1 AND NOT is_deleted
            RETURNING id, room_id, sender_id, content, created_at, is_edited, is_deleted
            "#,
        )
        .bind(i64::from(id))
        .bind(content.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn mark_deleted(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET is_deleted = TRUE
            WHERE id = $1
            RETURNING id, room_id, sender_id, content, created_at, is_edited, is_deleted
            "#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, created_at, is_edited, is_deleted
            FROM messages
            WHERE room_id = $1 AND NOT is_deleted
            ORDER BY created_at ASC, id ASC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgConnectionRepository {
    pool: PgPool,
}

impl PgConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionRepository for PgConnectionRepository {
    async fn create(&self, connection: Connection) -> Result<Connection, RepositoryError> {
        let record = sqlx::query_as::<_, ConnectionRecord>(
            r#"
            INSERT INTO connections (connection_id, user_id, connected_at)
            VALUES ($1, $2, $3)
            RETURNING connection_id, user_id, connected_at
            "#,
        )
        .bind(Uuid::from(connection.connection_id))
        .bind(Uuid::from(connection.user_id))
        .bind(connection.connected_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Connection::from(record))
    }

    async fn delete(&self, id: ConnectionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM connections WHERE connection_id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Connection>, RepositoryError> {
        let records = sqlx::query_as::<_, ConnectionRecord>(
            r#"SELECT connection_id, user_id, connected_at FROM connections"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Connection::from).collect())
    }
}

/// 一次性构建所有 PostgreSQL 仓储
pub struct PgStorage {
    pub pool: PgPool,
    pub room_repository: Arc<PgRoomRepository>,
    pub member_repository: Arc<PgRoomMemberRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub connection_repository: Arc<PgConnectionRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            room_repository: Arc::new(PgRoomRepository::new(pool.clone())),
            member_repository: Arc::new(PgRoomMemberRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            connection_repository: Arc::new(PgConnectionRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
