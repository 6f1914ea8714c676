//! 客户端与服务端之间的实时事件。
//!
//! 线上格式为 `{"type": "<名称>", ...camelCase 字段}`。

use domain::{Message, MessageId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 客户端发来的动作
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    SendMessage { room_id: RoomId, content: String },
    EditMessage { message_id: MessageId, content: String },
    DeleteMessage { message_id: MessageId },
    Typing { room_id: RoomId },
    StopTyping { room_id: RoomId },
    DestroyRoom { room_id: RoomId },
    GetRoomOnlineUsers { room_id: RoomId },
    GetOnlineUsers,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub connection_count: usize,
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    ReceiveMessage {
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        sender_name: String,
        /// 已删除的消息不携带正文
        content: Option<String>,
        created_at: Timestamp,
        is_edited: bool,
        is_deleted: bool,
    },
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
    },
    MessageEdited {
        id: MessageId,
        room_id: RoomId,
        content: String,
        is_edited: bool,
    },
    MessageDeleted {
        id: MessageId,
        room_id: RoomId,
        is_deleted: bool,
    },
    UserTyping {
        room_id: RoomId,
        user_id: UserId,
    },
    UserStoppedTyping {
        room_id: RoomId,
        user_id: UserId,
    },
    RoomOnlineUsers {
        room_id: RoomId,
        online_users: Vec<UserId>,
        count: usize,
    },
    RoomDestroyed {
        room_id: RoomId,
    },
    RoomJoined {
        room_id: RoomId,
        name: String,
    },
    OnlineUsers {
        users: Vec<OnlineUser>,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerEvent {
    pub fn received(message: &Message, sender_name: impl Into<String>) -> Self {
        ServerEvent::ReceiveMessage {
            id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name: sender_name.into(),
            content: message.body().into_content(),
            created_at: message.created_at,
            is_edited: message.is_edited,
            is_deleted: message.is_deleted,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{MessageContent, NewMessage};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn client_events_use_type_tag_and_camel_case() {
        let room = Uuid::new_v4();
        let parsed: ClientEvent = serde_json::from_value(json!({
            "type": "SendMessage",
            "roomId": room,
            "content": "hi"
        }))
        .expect("parse");
        assert_eq!(
            parsed,
            ClientEvent::SendMessage {
                room_id: RoomId::from(room),
                content: "hi".into()
            }
        );

        let ping: ClientEvent = serde_json::from_value(json!({"type": "Ping"})).expect("parse");
        assert_eq!(ping, ClientEvent::Ping);

        let edit: ClientEvent =
            serde_json::from_value(json!({"type": "EditMessage", "messageId": 3, "content": "x"}))
                .expect("parse");
        assert!(matches!(edit, ClientEvent::EditMessage { message_id: MessageId(3), .. }));
    }

    #[test]
    fn deleted_message_is_sent_without_content() {
        let mut message = Message::from_new(
            MessageId::new(1),
            NewMessage {
                room_id: RoomId::generate(),
                sender_id: UserId::from(Uuid::new_v4()),
                content: MessageContent::new("secret").expect("content"),
                created_at: Utc::now(),
            },
        );
        message.mark_deleted();

        let value = serde_json::to_value(ServerEvent::received(&message, "alice")).expect("json");
        assert_eq!(value["type"], "ReceiveMessage");
        assert_eq!(value["senderName"], "alice");
        assert_eq!(value["isDeleted"], true);
        assert!(value["content"].is_null());
    }

    #[test]
    fn unit_events_serialize_as_bare_tag() {
        let value = serde_json::to_value(ServerEvent::Pong).expect("json");
        assert_eq!(value, json!({"type": "Pong"}));
    }
}
