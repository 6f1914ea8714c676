use crate::value_objects::{ConnectionId, Timestamp, UserId};

/// 持久化的连接记录，在传输连接打开期间存在。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: Timestamp,
}

impl Connection {
    pub fn new(connection_id: ConnectionId, user_id: UserId, connected_at: Timestamp) -> Self {
        Self {
            connection_id,
            user_id,
            connected_at,
        }
    }
}
