//! 房间中心：连接网关。
//!
//! 负责鉴权、订阅与退订、按成员关系授权客户端动作，委托消息服务持久化，
//! 并把结果广播给房间的在线订阅者。每个连接有一个无界发送端，
//! 广播不会因为慢消费者而阻塞。

use std::sync::Arc;

use dashmap::DashMap;
use domain::{
    Connection, ConnectionId, DomainError, MessageId, RepositoryError, RoomId, RoomMember, UserId,
};
use tokio::sync::mpsc;

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::{ClientEvent, OnlineUser, ServerEvent},
    identity::{Principal, TokenVerifier},
    presence::PresenceRegistry,
    repository::{ConnectionRepository, RoomMemberRepository, RoomRepository},
    services::MessageService,
};

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// 已鉴权连接的会话信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub principal: Principal,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }
}

struct Sink {
    principal: Principal,
    sender: EventSender,
}

pub struct RoomHubDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub member_repository: Arc<dyn RoomMemberRepository>,
    pub connection_repository: Arc<dyn ConnectionRepository>,
    pub message_service: Arc<MessageService>,
    pub presence: Arc<PresenceRegistry>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoomHub {
    deps: RoomHubDependencies,
    sinks: DashMap<ConnectionId, Sink>,
}

impl RoomHub {
    pub fn new(deps: RoomHubDependencies) -> Self {
        Self {
            deps,
            sinks: DashMap::new(),
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.deps.presence
    }

    /// 建立连接：鉴权、上线、记录连接并自动订阅用户所在的全部房间。
    ///
    /// 任何一步失败都不会留下在线状态。
    pub async fn connect(
        &self,
        token: &str,
        sender: EventSender,
    ) -> Result<Session, ApplicationError> {
        let principal = self.deps.token_verifier.verify(token)?;
        let user_id = principal.user_id;
        let memberships = self.deps.member_repository.list_for_user(user_id).await?;

        // 先上线再写连接记录，清理任务看到记录时连接必定已在线
        let connection_id = ConnectionId::generate();
        self.sinks.insert(
            connection_id,
            Sink {
                principal: principal.clone(),
                sender,
            },
        );
        self.deps.presence.mark_online(user_id, connection_id);

        if let Err(err) = self
            .deps
            .connection_repository
            .create(Connection::new(connection_id, user_id, self.deps.clock.now()))
            .await
        {
            self.sinks.remove(&connection_id);
            self.deps.presence.mark_offline(connection_id);
            return Err(err.into());
        }

        for membership in &memberships {
            if self.deps.presence.subscribe_room(membership.room_id, user_id) {
                self.broadcast_except(
                    membership.room_id,
                    user_id,
                    ServerEvent::UserJoined {
                        room_id: membership.room_id,
                        user_id,
                        username: principal.username.clone(),
                    },
                );
            }
        }

        self.send_to(connection_id, self.online_users_snapshot());
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            rooms = memberships.len(),
            "连接已建立"
        );

        Ok(Session {
            connection_id,
            principal,
        })
    }

    /// 处理一条客户端动作；失败时只把错误发回给调用者。
    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        if let Err(err) = self.dispatch(session, event).await {
            if err.is_internal() {
                tracing::error!(user_id = %session.user_id(), error = %err, "处理客户端动作失败");
            } else {
                tracing::debug!(user_id = %session.user_id(), error = %err, "客户端动作被拒绝");
            }
            self.send_to(
                session.connection_id,
                ServerEvent::error(err.code(), err.to_string()),
            );
        }
    }

    pub async fn dispatch(
        &self,
        session: &Session,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(session, room_id).await,
            ClientEvent::LeaveRoom { room_id } => self.leave_room(session, room_id).await,
            ClientEvent::SendMessage { room_id, content } => {
                self.send_message(session, room_id, content).await
            }
            ClientEvent::EditMessage {
                message_id,
                content,
            } => self.edit_message(session, message_id, content).await,
            ClientEvent::DeleteMessage { message_id } => {
                self.delete_message(session, message_id).await
            }
            ClientEvent::Typing { room_id } => self.typing(session, room_id, true).await,
            ClientEvent::StopTyping { room_id } => self.typing(session, room_id, false).await,
            ClientEvent::DestroyRoom { room_id } => {
                self.destroy_room(session.user_id(), room_id).await
            }
            ClientEvent::GetRoomOnlineUsers { room_id } => {
                self.room_online_users(session, room_id).await
            }
            ClientEvent::GetOnlineUsers => {
                self.send_to(session.connection_id, self.online_users_snapshot());
                Ok(())
            }
            ClientEvent::Ping => {
                self.send_to(session.connection_id, ServerEvent::Pong);
                Ok(())
            }
        }
    }

    pub async fn join_room(
        &self,
        session: &Session,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        let user_id = session.user_id();
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        if self
            .deps
            .member_repository
            .find(room_id, user_id)
            .await?
            .is_none()
        {
            self.deps
                .member_repository
                .upsert(RoomMember::new(room_id, user_id, self.deps.clock.now()))
                .await
                .map_err(|err| match err {
                    // 查到房间之后被并发解散
                    RepositoryError::NotFound => ApplicationError::from(DomainError::RoomNotFound),
                    other => other.into(),
                })?;
        }

        if self.deps.presence.subscribe_room(room_id, user_id) {
            self.broadcast_except(
                room_id,
                user_id,
                ServerEvent::UserJoined {
                    room_id,
                    user_id,
                    username: session.principal.username.clone(),
                },
            );
        }
        self.send_to(
            session.connection_id,
            ServerEvent::RoomJoined {
                room_id,
                name: room.name,
            },
        );
        tracing::info!(room_id = %room_id, user_id = %user_id, "用户加入房间");
        Ok(())
    }

    pub async fn leave_room(
        &self,
        session: &Session,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        let user_id = session.user_id();
        self.require_member(room_id, user_id).await?;

        self.deps.member_repository.remove(room_id, user_id).await?;
        self.deps.presence.unsubscribe_room(room_id, user_id);
        self.broadcast(room_id, ServerEvent::UserLeft { room_id, user_id });
        tracing::info!(room_id = %room_id, user_id = %user_id, "用户离开房间");
        Ok(())
    }

    pub async fn send_message(
        &self,
        session: &Session,
        room_id: RoomId,
        content: String,
    ) -> Result<(), ApplicationError> {
        self.authorize(session, room_id).await?;
        let message = self
            .deps
            .message_service
            .send_message(room_id, session.user_id(), content)
            .await?;

        self.broadcast(
            room_id,
            ServerEvent::received(&message, session.principal.username.clone()),
        );
        Ok(())
    }

    pub async fn edit_message(
        &self,
        session: &Session,
        message_id: MessageId,
        content: String,
    ) -> Result<(), ApplicationError> {
        let message = self.deps.message_service.get_message(message_id).await?;
        self.authorize(session, message.room_id).await?;

        let updated = self
            .deps
            .message_service
            .edit_message(message_id, session.user_id(), content)
            .await?;
        self.broadcast(
            updated.room_id,
            ServerEvent::MessageEdited {
                id: updated.id,
                room_id: updated.room_id,
                content: updated.content.into_inner(),
                is_edited: updated.is_edited,
            },
        );
        Ok(())
    }

    pub async fn delete_message(
        &self,
        session: &Session,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let message = self.deps.message_service.get_message(message_id).await?;
        self.authorize(session, message.room_id).await?;

        let deleted = self
            .deps
            .message_service
            .delete_message(message_id, session.user_id())
            .await?;
        self.broadcast(
            deleted.room_id,
            ServerEvent::MessageDeleted {
                id: deleted.id,
                room_id: deleted.room_id,
                is_deleted: deleted.is_deleted,
            },
        );
        Ok(())
    }

    /// 输入状态不持久化，只转发给除本人所有连接以外的订阅者。
    pub async fn typing(
        &self,
        session: &Session,
        room_id: RoomId,
        started: bool,
    ) -> Result<(), ApplicationError> {
        let user_id = session.user_id();
        self.authorize(session, room_id).await?;

        let event = if started {
            ServerEvent::UserTyping { room_id, user_id }
        } else {
            ServerEvent::UserStoppedTyping { room_id, user_id }
        };
        self.broadcast_except(room_id, user_id, event);
        Ok(())
    }

    /// 解散房间，只有最早加入的成员有权限。
    ///
    /// 顺序为：通知订阅者、删除房间（级联成员与消息）、清空订阅。
    pub async fn destroy_room(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        let members = self.deps.member_repository.list_members(room_id).await?;
        let is_creator = members
            .first()
            .is_some_and(|creator| creator.user_id == user_id);
        if !is_creator {
            return Err(DomainError::NotRoomCreator.into());
        }

        self.broadcast(room_id, ServerEvent::RoomDestroyed { room_id });
        self.deps.room_repository.delete(room_id).await?;
        let evicted = self.deps.presence.clear_room(room_id);
        tracing::info!(room_id = %room_id, user_id = %user_id, evicted = evicted.len(), "房间已解散");
        Ok(())
    }

    pub async fn room_online_users(
        &self,
        session: &Session,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        self.authorize(session, room_id).await?;
        let online_users = self.deps.presence.online_members_of(room_id);
        self.send_to(
            session.connection_id,
            ServerEvent::RoomOnlineUsers {
                room_id,
                count: online_users.len(),
                online_users,
            },
        );
        Ok(())
    }

    /// 把新加入的成员接入房间的实时通道（例如通过 REST 拉人）。
    ///
    /// 用户不在线时什么也不做。
    pub fn attach_member(&self, room_id: RoomId, user_id: UserId) {
        let Some(username) = self.username_of(user_id) else {
            return;
        };
        if self.deps.presence.subscribe_room(room_id, user_id) {
            self.broadcast_except(
                room_id,
                user_id,
                ServerEvent::UserJoined {
                    room_id,
                    user_id,
                    username,
                },
            );
        }
    }

    /// 成员被移出房间后（例如通过 REST 踢人），撤销其订阅并通知房间。
    ///
    /// 被移出的用户同样收到 `UserLeft`，据此关闭本地的房间视图。
    pub fn detach_member(&self, room_id: RoomId, user_id: UserId) {
        let was_subscribed = self.deps.presence.unsubscribe_room(room_id, user_id);
        let event = ServerEvent::UserLeft { room_id, user_id };
        if was_subscribed {
            self.broadcast(room_id, event.clone());
        }
        for connection_id in self.deps.presence.connections_of(user_id) {
            self.send_to(connection_id, event.clone());
        }
    }

    /// 房间已从存储中移除后，通知并清空在线订阅者。返回被清出的用户。
    pub fn evict_room(&self, room_id: RoomId) -> Vec<UserId> {
        self.broadcast(room_id, ServerEvent::RoomDestroyed { room_id });
        self.deps.presence.clear_room(room_id)
    }

    /// 断开连接：先移除发送端，再删除连接记录，最后下线并通知。
    pub async fn disconnect(&self, session: &Session) {
        let connection_id = session.connection_id;
        self.sinks.remove(&connection_id);

        if let Err(err) = self
            .deps
            .connection_repository
            .delete(connection_id)
            .await
        {
            tracing::warn!(
                connection_id = %connection_id,
                error = %err,
                "删除连接记录失败，等待后台清理"
            );
        }

        let Some(outcome) = self.deps.presence.mark_offline(connection_id) else {
            return;
        };
        for room_id in &outcome.departed_rooms {
            self.broadcast(
                *room_id,
                ServerEvent::UserLeft {
                    room_id: *room_id,
                    user_id: outcome.user_id,
                },
            );
        }
        tracing::info!(
            user_id = %outcome.user_id,
            connection_id = %connection_id,
            last_connection = outcome.was_last_connection,
            "连接已断开"
        );
    }

    pub fn online_users_snapshot(&self) -> ServerEvent {
        let users = self
            .deps
            .presence
            .online_users()
            .into_iter()
            .map(|(user_id, connection_count)| OnlineUser {
                user_id,
                connection_count,
            })
            .collect();
        ServerEvent::OnlineUsers { users }
    }

    // 校验成员关系，并顺带修正在线订阅：在线但未订阅的成员会被补订阅
    async fn authorize(
        &self,
        session: &Session,
        room_id: RoomId,
    ) -> Result<RoomMember, ApplicationError> {
        let member = self.require_member(room_id, session.user_id()).await?;
        self.deps
            .presence
            .subscribe_room(room_id, session.user_id());
        Ok(member)
    }

    async fn require_member(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomMember, ApplicationError> {
        if let Some(member) = self.deps.member_repository.find(room_id, user_id).await? {
            return Ok(member);
        }
        let room_exists = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .is_some();
        if room_exists {
            Err(DomainError::NotAMember.into())
        } else {
            Err(DomainError::RoomNotFound.into())
        }
    }

    fn username_of(&self, user_id: UserId) -> Option<String> {
        self.deps
            .presence
            .connections_of(user_id)
            .into_iter()
            .find_map(|connection_id| {
                self.sinks
                    .get(&connection_id)
                    .map(|sink| sink.principal.username.clone())
            })
    }

    fn broadcast(&self, room_id: RoomId, event: ServerEvent) {
        self.fan_out(room_id, None, event);
    }

    fn broadcast_except(&self, room_id: RoomId, excluded: UserId, event: ServerEvent) {
        self.fan_out(room_id, Some(excluded), event);
    }

    // 先取订阅者与连接的快照，再逐个投递
    fn fan_out(&self, room_id: RoomId, excluded: Option<UserId>, event: ServerEvent) {
        let targets: Vec<ConnectionId> = self
            .deps
            .presence
            .online_members_of(room_id)
            .into_iter()
            .filter(|user_id| Some(*user_id) != excluded)
            .flat_map(|user_id| self.deps.presence.connections_of(user_id))
            .collect();

        for connection_id in targets {
            self.send_to(connection_id, event.clone());
        }
    }

    fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        let Some(sink) = self.sinks.get(&connection_id) else {
            return;
        };
        if sink.sender.send(event).is_err() {
            tracing::debug!(connection_id = %connection_id, "发送端已关闭，丢弃事件");
        }
    }
}
