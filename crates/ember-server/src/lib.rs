//! Ember Server Library
//!
//! Core functionality for the Ember chat backend:
//! - Bearer-token (JWT) authentication
//! - Stream relay from a generative-AI upstream to SSE clients
//! - Upstream integrations (OpenAI-compatible API, self-test ticker)
//! - `SQLite` storage for conversations and messages
//! - axum routes tying it together

pub mod auth;
pub mod relay;
pub mod server;
pub mod storage;
pub mod upstream;
