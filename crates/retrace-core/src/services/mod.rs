//! Service layer

pub mod auth_service;

pub use auth_service::{AuthContext, AuthService, Claims};
