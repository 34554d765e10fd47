pub mod auth;
pub mod common;
pub mod entity;

pub use auth::auth_routes;
pub use common::common_routes;
pub use entity::entity_routes;
