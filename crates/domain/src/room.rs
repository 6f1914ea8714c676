use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{RoomId, Timestamp};

/// 房间名称允许的最大字符数。
pub const MAX_ROOM_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub is_group: bool,
    pub created_at: Timestamp,
    /// 到期后由生命周期管理器回收；`None` 表示永久房间。
    pub expires_at: Option<Timestamp>,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        is_group: bool,
        created_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<Self, DomainError> {
        let name = Self::validate_name(name.into())?;
        if let Some(expires_at) = expires_at {
            if expires_at <= created_at {
                return Err(DomainError::invalid_argument(
                    "expires_at",
                    "must be later than creation time",
                ));
            }
        }
        Ok(Self {
            id,
            name,
            is_group,
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }

    fn validate_name(name: String) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("room_name", "cannot be empty"));
        }
        if trimmed.chars().count() > MAX_ROOM_NAME_LENGTH {
            return Err(DomainError::invalid_argument("room_name", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}
