//! HTTP layer of the Agora Q&A platform: route handlers, auth middleware,
//! image storage and the assistant proxy.

pub mod admin;
pub mod ai;
pub mod answers;
pub mod auth;
pub mod error;
pub mod images;
pub mod middleware;
pub mod questions;
pub mod users;
