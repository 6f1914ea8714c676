//! 在线状态注册表
//!
//! 进程内维护 `userId -> {connectionId}` 与 `roomId -> {userId}` 两张表，
//! 按 key 加锁（DashMap 分片），不存在全局锁。所有方法都是同步的，
//! 调用方不会在持有锁时跨越 `.await`。
//!
//! 加锁顺序固定为 `online_users -> connection_owner`、
//! `online_users -> user_rooms -> room_subscribers`，
//! 不按此顺序的路径一次只持有一个守卫。

use std::collections::HashSet;

use dashmap::{mapref::entry::Entry, DashMap};
use domain::{ConnectionId, RoomId, UserId};

/// 连接下线的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineOutcome {
    pub user_id: UserId,
    pub was_last_connection: bool,
    /// 仅在最后一个连接断开时非空
    pub departed_rooms: Vec<RoomId>,
}

#[derive(Default)]
pub struct PresenceRegistry {
    online_users: DashMap<UserId, HashSet<ConnectionId>>,
    connection_owner: DashMap<ConnectionId, UserId>,
    room_subscribers: DashMap<RoomId, HashSet<UserId>>,
    user_rooms: DashMap<UserId, HashSet<RoomId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_online(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut connections = self.online_users.entry(user_id).or_default();
        connections.insert(connection_id);
        self.connection_owner.insert(connection_id, user_id);
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            connections = connections.len(),
            "用户上线"
        );
    }

    /// 移除连接；最后一个连接断开时，同时把用户从所有房间订阅中清除。
    ///
    /// 清除过程持有该用户的表项锁，同一用户并发的 `mark_online`
    /// 会排在清除之后。未知连接返回 `None`。
    pub fn mark_offline(&self, connection_id: ConnectionId) -> Option<OfflineOutcome> {
        let user_id = *self.connection_owner.get(&connection_id)?;

        let Entry::Occupied(mut entry) = self.online_users.entry(user_id) else {
            self.connection_owner.remove(&connection_id);
            return None;
        };

        entry.get_mut().remove(&connection_id);
        self.connection_owner.remove(&connection_id);

        if !entry.get().is_empty() {
            return Some(OfflineOutcome {
                user_id,
                was_last_connection: false,
                departed_rooms: Vec::new(),
            });
        }

        let departed_rooms = self.purge_user_rooms(user_id);
        entry.remove();
        tracing::debug!(user_id = %user_id, rooms = departed_rooms.len(), "用户最后一个连接断开");

        Some(OfflineOutcome {
            user_id,
            was_last_connection: true,
            departed_rooms,
        })
    }

    /// 订阅房间，返回是否为新订阅。
    ///
    /// 只有在线用户可以订阅；离线用户直接返回 `false`。
    pub fn subscribe_room(&self, room_id: RoomId, user_id: UserId) -> bool {
        let Some(_online) = self.online_users.get(&user_id) else {
            return false;
        };
        let mut rooms = self.user_rooms.entry(user_id).or_default();
        rooms.insert(room_id);
        let inserted = self
            .room_subscribers
            .entry(room_id)
            .or_default()
            .insert(user_id);
        drop(rooms);
        inserted
    }

    /// 取消订阅，返回之前是否已订阅。
    pub fn unsubscribe_room(&self, room_id: RoomId, user_id: UserId) -> bool {
        if let Some(mut rooms) = self.user_rooms.get_mut(&user_id) {
            rooms.remove(&room_id);
        }
        self.user_rooms.remove_if(&user_id, |_, rooms| rooms.is_empty());

        let removed = self
            .room_subscribers
            .get_mut(&room_id)
            .map(|mut users| users.remove(&user_id))
            .unwrap_or(false);
        self.room_subscribers
            .remove_if(&room_id, |_, users| users.is_empty());
        removed
    }

    /// 清空房间的订阅集合（房间解散或过期），返回原订阅者。
    pub fn clear_room(&self, room_id: RoomId) -> Vec<UserId> {
        let Some((_, users)) = self.room_subscribers.remove(&room_id) else {
            return Vec::new();
        };
        for user_id in &users {
            if let Some(mut rooms) = self.user_rooms.get_mut(user_id) {
                rooms.remove(&room_id);
            }
            self.user_rooms.remove_if(user_id, |_, rooms| rooms.is_empty());
        }
        users.into_iter().collect()
    }

    /// 房间在线订阅者快照
    pub fn online_members_of(&self, room_id: RoomId) -> Vec<UserId> {
        self.room_subscribers
            .get(&room_id)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn connections_of(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.online_users
            .get(&user_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online_users.contains_key(&user_id)
    }

    pub fn is_connection_live(&self, connection_id: ConnectionId) -> bool {
        self.connection_owner.contains_key(&connection_id)
    }

    pub fn is_subscribed(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.room_subscribers
            .get(&room_id)
            .is_some_and(|users| users.contains(&user_id))
    }

    /// 全部在线用户及其连接数
    pub fn online_users(&self) -> Vec<(UserId, usize)> {
        self.online_users
            .iter()
            .map(|entry| (*entry.key(), entry.value().len()))
            .collect()
    }

    // 调用方必须持有该用户在 online_users 中的表项锁
    fn purge_user_rooms(&self, user_id: UserId) -> Vec<RoomId> {
        let Some((_, rooms)) = self.user_rooms.remove(&user_id) else {
            return Vec::new();
        };
        for room_id in &rooms {
            if let Some(mut users) = self.room_subscribers.get_mut(room_id) {
                users.remove(&user_id);
            }
            self.room_subscribers
                .remove_if(room_id, |_, users| users.is_empty());
        }
        rooms.into_iter().collect()
    }
}
