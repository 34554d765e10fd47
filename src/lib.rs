//! orgflow: configuration-driven organization/process management backend.
//! Entity descriptors (JSON) drive table creation, REST routes, validation,
//! relationship hydration, and live WebSocket events.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod ws;

pub use config::{load_from_dir, resolve, EntityConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError, FieldError};
pub use response::{ListPage, Pagination};
pub use routes::{auth_routes, common_routes, entity_routes};
pub use service::{EntityService, ListQuery, ValidationService};
pub use settings::Settings;
pub use state::AppState;
pub use store::{connect, connect_in_memory, ensure_tables, ensure_users_table};
pub use ws::Hub;
