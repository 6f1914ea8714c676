//! 消息服务单元测试
//!
//! 覆盖发送、编辑、删除与分页查询。

#[cfg(test)]
mod message_service_tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use domain::{
        DomainError, Message, MessageContent, MessageId, NewMessage, RepositoryError, Room,
        RoomId, RoomMember, UserId,
    };
    use tokio::sync::oneshot;
    use uuid::Uuid;

    use crate::clock::{Clock, ManualClock};
    use crate::error::ApplicationError;
    use crate::memory::InMemoryStore;
    use crate::repository::{MessageRepository, RoomMemberRepository, RoomRepository};
    use crate::services::{MessageService, MessageServiceDependencies};

    type Pause = (oneshot::Sender<()>, oneshot::Receiver<()>);

    /// 第一次按 ID 读取消息后挂起，直到测试放行
    struct PausingMessages {
        inner: Arc<InMemoryStore>,
        pause: Mutex<Option<Pause>>,
    }

    #[async_trait]
    impl MessageRepository for PausingMessages {
        async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
            MessageRepository::create(self.inner.as_ref(), message).await
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            let found = MessageRepository::find_by_id(self.inner.as_ref(), id).await;
            let pause = self.pause.lock().expect("pause lock").take();
            if let Some((reached, release)) = pause {
                let _ = reached.send(());
                let _ = release.await;
            }
            found
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

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        service: MessageService,
        room_id: RoomId,
        alice: UserId,
        bob: UserId,
    }

    /// 准备测试环境：一个房间，alice 和 bob 都是成员
    async fn setup() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let alice = UserId::from(Uuid::new_v4());
        let bob = UserId::from(Uuid::new_v4());
        let now = clock.now();

        let room = Room::new(RoomId::generate(), "general", true, now, None).expect("room");
        let room_id = room.id;
        store
            .create_with_member(room, RoomMember::new(room_id, alice, now))
            .await
            .expect("create room");
        store
            .upsert(RoomMember::new(room_id, bob, now))
            .await
            .expect("add bob");

        let service = MessageService::new(MessageServiceDependencies {
            room_repository: store.clone(),
            member_repository: store.clone(),
            message_repository: store.clone(),
            clock: clock.clone(),
        });

        Fixture {
            store,
            clock,
            service,
            room_id,
            alice,
            bob,
        }
    }

    fn domain_err(result: Result<impl std::fmt::Debug, ApplicationError>) -> DomainError {
        match result {
            Err(ApplicationError::Domain(err)) => err,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_then_history_returns_message_once() {
        let f = setup().await;

        let sent = f
            .service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");
        assert_eq!(sent.id, MessageId::new(1));
        assert!(!sent.is_edited && !sent.is_deleted);

        let history = f
            .service
            .get_room_messages(f.room_id, 1, 50)
            .await
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_str(), "hi");
    }

    #[tokio::test]
    async fn test_send_requires_membership_and_valid_content() {
        let f = setup().await;
        let stranger = UserId::from(Uuid::new_v4());

        let err = domain_err(f.service.send_message(f.room_id, stranger, "hi".into()).await);
        assert_eq!(err, DomainError::NotAMember);

        let err = domain_err(f.service.send_message(f.room_id, f.alice, "   ".into()).await);
        assert!(matches!(err, DomainError::InvalidContent { .. }));

        let err = domain_err(
            f.service
                .send_message(RoomId::generate(), f.alice, "hi".into())
                .await,
        );
        assert_eq!(err, DomainError::RoomNotFound);

        let history = f
            .service
            .get_room_messages(f.room_id, 1, 50)
            .await
            .expect("history");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_edit_by_other_user_is_rejected() {
        let f = setup().await;
        let sent = f
            .service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");

        let err = domain_err(f.service.edit_message(sent.id, f.bob, "hacked".into()).await);
        assert_eq!(err, DomainError::NotOwner);

        let current = f.service.get_message(sent.id).await.expect("message");
        assert_eq!(current.content.as_str(), "hi");
        assert!(!current.is_edited);
    }

    #[tokio::test]
    async fn test_edit_and_delete_flow() {
        let f = setup().await;
        let sent = f
            .service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");

        let edited = f
            .service
            .edit_message(sent.id, f.alice, "hello".into())
            .await
            .expect("edit");
        assert!(edited.is_edited);
        assert_eq!(edited.content.as_str(), "hello");

        let deleted = f
            .service
            .delete_message(sent.id, f.alice)
            .await
            .expect("delete");
        assert!(deleted.is_deleted);
        assert_eq!(deleted.id, sent.id);
        assert_eq!(deleted.body().content(), None);

        let history = f
            .service
            .get_room_messages(f.room_id, 1, 50)
            .await
            .expect("history");
        assert!(history.is_empty());

        let err = domain_err(f.service.edit_message(sent.id, f.alice, "again".into()).await);
        assert_eq!(err, DomainError::AlreadyDeleted);
    }

    #[tokio::test]
    async fn test_delete_wins_over_edit_that_read_first() {
        let f = setup().await;
        let sent = f
            .service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");

        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let service = Arc::new(MessageService::new(MessageServiceDependencies {
            room_repository: f.store.clone(),
            member_repository: f.store.clone(),
            message_repository: Arc::new(PausingMessages {
                inner: f.store.clone(),
                pause: Mutex::new(Some((reached_tx, release_rx))),
            }),
            clock: f.clock.clone(),
        }));

        let editor = tokio::spawn({
            let service = service.clone();
            let alice = f.alice;
            async move { service.edit_message(sent.id, alice, "rewritten".into()).await }
        });
        reached_rx.await.expect("edit paused after reading the message");

        let deleted = service
            .delete_message(sent.id, f.alice)
            .await
            .expect("delete");
        assert!(deleted.is_deleted);
        release_tx.send(()).expect("release edit");

        let err = domain_err(editor.await.expect("edit task"));
        assert_eq!(err, DomainError::AlreadyDeleted);

        let stored = f.service.get_message(sent.id).await.expect("message");
        assert!(stored.is_deleted);
        assert!(!stored.is_edited);
        assert_eq!(stored.content.as_str(), "hi");
        let history = f
            .service
            .get_room_messages(f.room_id, 1, 50)
            .await
            .expect("history");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_delete_is_idempotent() {
        let f = setup().await;
        let sent = f
            .service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");

        let first = f.service.delete_message(sent.id, f.alice).await.expect("delete");
        let second = f.service.delete_message(sent.id, f.alice).await.expect("delete");
        assert_eq!(first, second);

        let err = domain_err(f.service.delete_message(sent.id, f.bob).await);
        assert_eq!(err, DomainError::NotOwner);
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let f = setup().await;
        let err = domain_err(f.service.delete_message(MessageId::new(99), f.alice).await);
        assert_eq!(err, DomainError::MessageNotFound);
    }

    #[tokio::test]
    async fn test_pagination_over_many_messages() {
        let f = setup().await;
        for i in 0..120 {
            f.service
                .send_message(f.room_id, f.alice, format!("message {i}"))
                .await
                .expect("send");
            f.clock.advance(Duration::milliseconds(1));
        }

        let first = f
            .service
            .get_room_messages(f.room_id, 1, 50)
            .await
            .expect("page 1");
        assert_eq!(first.len(), 50);
        assert_eq!(first[0].content.as_str(), "message 0");
        assert_eq!(first[49].content.as_str(), "message 49");

        let third = f
            .service
            .get_room_messages(f.room_id, 3, 50)
            .await
            .expect("page 3");
        assert_eq!(third.len(), 20);
        assert_eq!(third[0].content.as_str(), "message 100");
        assert_eq!(third[19].content.as_str(), "message 119");

        let fallback = f
            .service
            .get_room_messages(f.room_id, 0, 0)
            .await
            .expect("defaults");
        assert_eq!(fallback, first);
    }

    #[tokio::test]
    async fn test_history_of_deleted_room_is_gone() {
        let f = setup().await;
        f.service
            .send_message(f.room_id, f.alice, "hi".into())
            .await
            .expect("send");
        RoomRepository::delete(f.store.as_ref(), f.room_id)
            .await
            .expect("delete room");

        let err = domain_err(f.service.get_room_messages(f.room_id, 1, 50).await);
        assert_eq!(err, DomainError::RoomNotFound);
    }
}
