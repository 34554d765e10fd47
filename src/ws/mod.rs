pub mod handler;
pub mod hub;

pub use handler::ws_upgrade;
pub use hub::{Hub, RoomEvent};
