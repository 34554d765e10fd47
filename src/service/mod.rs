pub mod entity;
pub mod transition;
pub mod validation;

pub use entity::{EntityService, ListQuery};
pub use transition::Transition;
pub use validation::{ValidationMode, ValidationService};
