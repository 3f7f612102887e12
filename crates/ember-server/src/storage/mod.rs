//! `SQLite` storage for the Ember server.
//!
//! Persists conversations and their messages.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::AppDatabase;
pub use ember_core::db::DatabaseError;
pub use models::*;
