//! Authentication for the Ember server.
//!
//! Provides JWT issuance/validation and the bearer-token middleware that
//! guards the chat routes.

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtManager;
pub use middleware::require_auth;
