//! HTTP surface: routes, handlers and error mapping.

pub mod chat;
pub mod error;
pub mod health;
pub mod routes;
pub mod selftest;
pub mod sse;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
