//! Ember Core Library
//!
//! Shared functionality for Ember components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool and migration helpers
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
