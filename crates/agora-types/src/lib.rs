//! Shared types for the Agora Q&A platform.
//!
//! Everything that crosses a crate boundary lives here: the role and
//! moderation-status enums, the JWT claims, and the request/response
//! bodies of the REST API.

pub mod api;
pub mod models;
