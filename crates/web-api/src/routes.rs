use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{CreateRoomRequest, RoomDetails, RoomSummary};
use domain::{Message, MessageId, Room, RoomId, RoomMember, Timestamp, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload {
    name: String,
    #[serde(default = "default_is_group")]
    is_group: bool,
    ttl_seconds: Option<i64>,
}

fn default_is_group() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMemberPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    page: Option<i64>,
    page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: RoomId,
    pub name: String,
    pub is_group: bool,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            is_group: room.is_group,
            created_at: room.created_at,
            expires_at: room.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryResponse {
    pub room: RoomResponse,
    pub member_count: usize,
    pub joined_at: Timestamp,
}

impl From<RoomSummary> for RoomSummaryResponse {
    fn from(summary: RoomSummary) -> Self {
        Self {
            room: summary.room.into(),
            member_count: summary.member_count,
            joined_at: summary.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub user_id: UserId,
    pub joined_at: Timestamp,
}

impl From<RoomMember> for MemberResponse {
    fn from(member: RoomMember) -> Self {
        Self {
            user_id: member.user_id,
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailsResponse {
    pub room: RoomResponse,
    pub members: Vec<MemberResponse>,
}

impl From<RoomDetails> for RoomDetailsResponse {
    fn from(details: RoomDetails) -> Self {
        Self {
            room: details.room.into(),
            members: details.members.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// 已删除的消息不返回正文
    pub content: Option<String>,
    pub created_at: Timestamp,
    pub is_edited: bool,
    pub is_deleted: bool,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.body().into_content(),
            created_at: message.created_at,
            is_edited: message.is_edited,
            is_deleted: message.is_deleted,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(destroy_room))
        .route("/rooms/{room_id}/members", post(add_member))
        .route("/rooms/{room_id}/members/{user_id}", delete(remove_member))
        .route("/rooms/{room_id}/messages", get(get_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let ttl = match payload.ttl_seconds {
        Some(seconds) => Some(
            chrono::Duration::try_seconds(seconds)
                .ok_or_else(|| ApiError::bad_request("ttlSeconds out of range"))?,
        ),
        None => None,
    };
    let room = state
        .room_service
        .create_room(CreateRoomRequest {
            name: payload.name,
            is_group: payload.is_group,
            creator_id: principal.user_id,
            ttl,
        })
        .await?;

    // 创建者在线时立即接入房间
    state.hub.attach_member(room.id, principal.user_id);

    Ok((StatusCode::CREATED, Json(room.into())))
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummaryResponse>>, ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let rooms = state
        .room_service
        .list_rooms_for_user(principal.user_id)
        .await?;

    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDetailsResponse>, ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let details = state
        .room_service
        .get_room(RoomId::from(room_id), principal.user_id)
        .await?;

    Ok(Json(details.into()))
}

async fn destroy_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    state
        .hub
        .destroy_room(principal.user_id, RoomId::from(room_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<AddMemberPayload>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let room_id = RoomId::from(room_id);
    let (member, newly_added) = state
        .room_service
        .add_member(room_id, principal.user_id, UserId::from(payload.user_id))
        .await?;

    if !newly_added {
        return Ok((StatusCode::OK, Json(member.into())));
    }
    state.hub.attach_member(room_id, member.user_id);
    Ok((StatusCode::CREATED, Json(member.into())))
}

async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let room_id = RoomId::from(room_id);
    let user_id = UserId::from(user_id);
    let removed = state
        .room_service
        .remove_member(room_id, principal.user_id, user_id)
        .await?;

    if removed {
        state.hub.detach_member(room_id, user_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let principal = state.jwt_service.extract_principal_from_headers(&headers)?;
    let room_id = RoomId::from(room_id);
    state
        .room_service
        .ensure_member(room_id, principal.user_id)
        .await?;

    let items = state
        .message_service
        .get_room_messages(
            room_id,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(0),
        )
        .await?;

    Ok(Json(items.into_iter().map(Into::into).collect()))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing token"))?;
    // 握手前先拒绝无效 token
    state.jwt_service.verify_token(&token)?;

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, token).run()))
}
