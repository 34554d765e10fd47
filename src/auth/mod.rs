pub mod extract;
pub mod jwt;
pub mod password;
pub mod user;

pub use extract::CurrentUser;
pub use jwt::{Claims, TokenIssuer, TokenType};
pub use user::User;
