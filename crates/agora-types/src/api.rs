//! REST API request and response bodies.
//!
//! Identifiers and timestamps travel as strings (UUIDs and RFC 3339) so the
//! response shapes mirror the stored rows directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

/// JWT claims carried by every authenticated request. Canonical definition
/// shared by token issuance and the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email address; either logs in.
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires: DateTime<Utc>,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

// -- Questions & answers --

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    /// Serving URLs of the attached images.
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionListResponse {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<QuestionResponse>,
}

#[derive(Debug, Serialize)]
pub struct QuestionDetailResponse {
    pub question: QuestionResponse,
    pub answers: Vec<AnswerResponse>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub id: String,
    pub body: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

/// Body returned right after posting an answer.
#[derive(Debug, Serialize)]
pub struct AnswerCreatedResponse {
    pub id: String,
    pub body: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

// -- Moderation --

#[derive(Debug, Serialize)]
pub struct ModerationResponse {
    pub id: String,
    pub status: String,
}

/// Pending answer as shown in the review queue, with enough context to
/// judge it without loading the question.
#[derive(Debug, Serialize)]
pub struct PendingAnswer {
    pub id: String,
    pub body: String,
    pub question_title: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

// -- User administration --

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub username: String,
    pub email: String,
    pub role: Role,
    /// When present and non-blank, replaces the stored password.
    pub new_password: Option<String>,
}

// -- Assistant --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiChatRequest {
    pub prompt: String,
    /// Overrides the default model when set.
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AiChatResponse {
    pub answer: String,
}
