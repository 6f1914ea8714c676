//! 单元测试共用的装配代码

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Connection, ConnectionId, Message, MessageContent, MessageId, NewMessage, RepositoryError,
    Room, RoomId, RoomMember, Timestamp, UserId,
};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    clock::ManualClock,
    error::ApplicationError,
    events::ServerEvent,
    hub::{EventReceiver, RoomHub, RoomHubDependencies, Session},
    identity::{MockTokenVerifier, Principal},
    memory::InMemoryStore,
    presence::PresenceRegistry,
    repository::{ConnectionRepository, MessageRepository, RoomMemberRepository, RoomRepository},
    services::{
        CreateRoomRequest, MessageService, MessageServiceDependencies, RoomService,
        RoomServiceDependencies,
    },
};

/// 挂起点：到达时通知测试，等待测试放行
pub(crate) type Pause = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// 包装内存存储，按开关注入存储故障
pub(crate) struct FaultyStore {
    inner: Arc<InMemoryStore>,
    pub fail_message_create: AtomicBool,
    pub fail_connection_create: AtomicBool,
    pub fail_connection_delete: AtomicBool,
    /// 下一次写入成员关系前，房间先被删除
    pub drop_room_before_upsert: AtomicBool,
    /// 连接记录写入之后、返回之前挂起一次
    pub pause_after_connection_create: Mutex<Option<Pause>>,
}

impl FaultyStore {
    fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_message_create: AtomicBool::new(false),
            fail_connection_create: AtomicBool::new(false),
            fail_connection_delete: AtomicBool::new(false),
            drop_room_before_upsert: AtomicBool::new(false),
            pause_after_connection_create: Mutex::new(None),
        }
    }

    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn injected() -> RepositoryError {
        RepositoryError::storage("injected failure")
    }
}

#[async_trait]
impl RoomRepository for FaultyStore {
    async fn create_with_member(
        &self,
        room: Room,
        creator: RoomMember,
    ) -> Result<Room, RepositoryError> {
        self.inner.create_with_member(room, creator).await
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        RoomRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        RoomRepository::delete(self.inner.as_ref(), id).await
    }

    async fn list_expired(&self, now: Timestamp) -> Result<Vec<Room>, RepositoryError> {
        self.inner.list_expired(now).await
    }
}

#[async_trait]
impl RoomMemberRepository for FaultyStore {
    async fn upsert(&self, member: RoomMember) -> Result<RoomMember, RepositoryError> {
        if self.drop_room_before_upsert.swap(false, Ordering::SeqCst) {
            RoomRepository::delete(self.inner.as_ref(), member.room_id).await?;
        }
        self.inner.upsert(member).await
    }

    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<RoomMember>, RepositoryError> {
        self.inner.find(room_id, user_id).await
    }

    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner.remove(room_id, user_id).await
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomMember>, RepositoryError> {
        self.inner.list_members(room_id).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RoomMember>, RepositoryError> {
        self.inner.list_for_user(user_id).await
    }
}

#[async_trait]
impl MessageRepository for FaultyStore {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        if self.fail_message_create.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        MessageRepository::create(self.inner.as_ref(), message).await
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        MessageRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: MessageContent,
    ) -> Result<Option<Message>, RepositoryError> {
        self.inner.update_content(id, content).await
    }

    async fn mark_deleted(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        self.inner.mark_deleted(id).await
    }

    async fn list_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.inner.list_page(room_id, offset, limit).await
    }
}

#[async_trait]
impl ConnectionRepository for FaultyStore {
    async fn create(&self, connection: Connection) -> Result<Connection, RepositoryError> {
        if self.fail_connection_create.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        let stored = ConnectionRepository::create(self.inner.as_ref(), connection).await?;
        let pause = self
            .pause_after_connection_create
            .lock()
            .expect("pause lock")
            .take();
        if let Some((reached, release)) = pause {
            let _ = reached.send(());
            let _ = release.await;
        }
        Ok(stored)
    }

    async fn delete(&self, id: ConnectionId) -> Result<(), RepositoryError> {
        if self.fail_connection_delete.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        ConnectionRepository::delete(self.inner.as_ref(), id).await
    }

    async fn list_all(&self) -> Result<Vec<Connection>, RepositoryError> {
        self.inner.list_all().await
    }
}

pub(crate) struct HubFixture {
    /// 底层存储，直接读写时绕过故障注入
    pub store: Arc<InMemoryStore>,
    /// 服务实际使用的存储
    pub faults: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub presence: Arc<PresenceRegistry>,
    pub messages: Arc<MessageService>,
    pub rooms: RoomService,
    pub hub: Arc<RoomHub>,
    users: HashMap<String, Principal>,
}

/// 令牌即用户名；未登记的令牌校验失败
pub(crate) fn hub_fixture(names: &[&str]) -> HubFixture {
    let store = Arc::new(InMemoryStore::new());
    let faults = Arc::new(FaultyStore::new(store.clone()));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let presence = Arc::new(PresenceRegistry::new());

    let users: HashMap<String, Principal> = names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                Principal {
                    user_id: UserId::from(Uuid::new_v4()),
                    username: name.to_string(),
                },
            )
        })
        .collect();

    let known = users.clone();
    let mut verifier = MockTokenVerifier::new();
    verifier.expect_verify().returning(move |token| {
        known
            .get(token)
            .cloned()
            .ok_or_else(|| ApplicationError::unauthenticated("unknown token"))
    });

    let messages = Arc::new(MessageService::new(MessageServiceDependencies {
        room_repository: faults.clone(),
        member_repository: faults.clone(),
        message_repository: faults.clone(),
        clock: clock.clone(),
    }));
    let rooms = RoomService::new(RoomServiceDependencies {
        room_repository: faults.clone(),
        member_repository: faults.clone(),
        clock: clock.clone(),
    });
    let hub = Arc::new(RoomHub::new(RoomHubDependencies {
        room_repository: faults.clone(),
        member_repository: faults.clone(),
        connection_repository: faults.clone(),
        message_service: messages.clone(),
        presence: presence.clone(),
        token_verifier: Arc::new(verifier),
        clock: clock.clone(),
    }));

    HubFixture {
        store,
        faults,
        clock,
        presence,
        messages,
        rooms,
        hub,
        users,
    }
}

impl HubFixture {
    pub fn user(&self, name: &str) -> UserId {
        self.users[name].user_id
    }

    pub async fn connect(&self, name: &str) -> (Session, EventReceiver) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = self.hub.connect(name, tx).await.expect("connect");
        // 丢弃连接时推送的在线列表
        drain(&mut rx);
        (session, rx)
    }

    pub async fn create_room(&self, creator: &str, name: &str) -> RoomId {
        self.rooms
            .create_room(CreateRoomRequest {
                name: name.to_string(),
                is_group: true,
                creator_id: self.user(creator),
                ttl: None,
            })
            .await
            .expect("create room")
            .id
    }
}

pub(crate) fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
