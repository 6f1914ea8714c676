mod message_service;
mod room_service;

#[cfg(test)]
mod message_service_tests;

pub use message_service::{MessageService, MessageServiceDependencies};
pub use room_service::{
    CreateRoomRequest, RoomDetails, RoomService, RoomServiceDependencies, RoomSummary,
};
