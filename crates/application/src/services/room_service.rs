use std::sync::Arc;

use chrono::Duration;
use domain::{DomainError, Room, RoomId, RoomMember, Timestamp, UserId};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{RoomMemberRepository, RoomRepository},
};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub is_group: bool,
    pub creator_id: UserId,
    /// 房间存活时长，`None` 表示永久
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room: Room,
    pub member_count: usize,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDetails {
    pub room: Room,
    pub members: Vec<RoomMember>,
}

pub struct RoomServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub member_repository: Arc<dyn RoomMemberRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoomService {
    deps: RoomServiceDependencies,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<Room, ApplicationError> {
        let now = self.deps.clock.now();
        let expires_at = match request.ttl {
            Some(ttl) if ttl <= Duration::zero() => {
                return Err(DomainError::invalid_argument("ttl", "must be positive").into());
            }
            Some(ttl) => Some(
                now.checked_add_signed(ttl)
                    .ok_or_else(|| DomainError::invalid_argument("ttl", "too large"))?,
            ),
            None => None,
        };

        let room = Room::new(
            RoomId::generate(),
            request.name,
            request.is_group,
            now,
            expires_at,
        )?;
        let creator = RoomMember::new(room.id, request.creator_id, now);

        let room = self
            .deps
            .room_repository
            .create_with_member(room, creator)
            .await?;
        tracing::info!(room_id = %room.id, creator_id = %request.creator_id, "房间已创建");
        Ok(room)
    }

    pub async fn list_rooms_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoomSummary>, ApplicationError> {
        let memberships = self.deps.member_repository.list_for_user(user_id).await?;
        let mut summaries = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let Some(room) = self
                .deps
                .room_repository
                .find_by_id(membership.room_id)
                .await?
            else {
                continue;
            };
            let member_count = self
                .deps
                .member_repository
                .list_members(room.id)
                .await?
                .len();
            summaries.push(RoomSummary {
                room,
                member_count,
                joined_at: membership.joined_at,
            });
        }
        Ok(summaries)
    }

    pub async fn get_room(
        &self,
        room_id: RoomId,
        requester_id: UserId,
    ) -> Result<RoomDetails, ApplicationError> {
        let room = self.find_room(room_id).await?;
        let members = self.deps.member_repository.list_members(room_id).await?;
        if !members.iter().any(|member| member.user_id == requester_id) {
            return Err(DomainError::NotAMember.into());
        }
        Ok(RoomDetails { room, members })
    }

    /// 成员拉人；目标已在房间中时原样返回。第二个返回值表示是否新加入。
    pub async fn add_member(
        &self,
        room_id: RoomId,
        operator_id: UserId,
        user_id: UserId,
    ) -> Result<(RoomMember, bool), ApplicationError> {
        self.ensure_member(room_id, operator_id).await?;

        if let Some(existing) = self.deps.member_repository.find(room_id, user_id).await? {
            return Ok((existing, false));
        }
        let member = self
            .deps
            .member_repository
            .upsert(RoomMember::new(room_id, user_id, self.deps.clock.now()))
            .await?;
        tracing::info!(room_id = %room_id, user_id = %user_id, operator_id = %operator_id, "成员已加入");
        Ok((member, true))
    }

    /// 成员移出某人（也可以是自己）。目标本就不在房间中时不做改动，返回 `false`。
    pub async fn remove_member(
        &self,
        room_id: RoomId,
        operator_id: UserId,
        user_id: UserId,
    ) -> Result<bool, ApplicationError> {
        self.ensure_member(room_id, operator_id).await?;

        if self
            .deps
            .member_repository
            .find(room_id, user_id)
            .await?
            .is_none()
        {
            return Ok(false);
        }
        self.deps.member_repository.remove(room_id, user_id).await?;
        tracing::info!(room_id = %room_id, user_id = %user_id, operator_id = %operator_id, "成员已移出");
        Ok(true)
    }

    /// 房间存在且用户是成员时返回成员关系
    pub async fn ensure_member(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomMember, ApplicationError> {
        self.find_room(room_id).await?;
        self.deps
            .member_repository
            .find(room_id, user_id)
            .await?
            .ok_or_else(|| DomainError::NotAMember.into())
    }

    async fn find_room(&self, room_id: RoomId) -> Result<Room, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }
}
