use std::sync::Arc;

use application::{MessageService, RoomHub, RoomService};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
    pub room_service: Arc<RoomService>,
    pub message_service: Arc<MessageService>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        hub: Arc<RoomHub>,
        room_service: Arc<RoomService>,
        message_service: Arc<MessageService>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            hub,
            room_service,
            message_service,
            jwt_service,
        }
    }
}
