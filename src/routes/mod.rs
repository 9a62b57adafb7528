mod auth;
mod health_check;

pub use auth::{login, logout, refresh, update_password, TokenPairResponse};
pub use health_check::health_check;
