//! Row types for the database layer. These map one-to-one onto SQLite rows
//! and stay separate from the wire types in `agora-types`.

/// A user account. `password` holds the Argon2 hash, never plaintext.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct QuestionRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub id: String,
    pub question_id: String,
    pub author_id: String,
    pub body: String,
    pub status: String,
    pub created_at: String,
}

/// An image attachment. At least one parent id is always set; the answer
/// link wins when both are present.
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: String,
    pub path: String,
    pub question_id: Option<String>,
    pub answer_id: Option<String>,
    pub uploaded_at: String,
}

/// A question as the read paths need it: author resolved to a username,
/// image paths attached.
#[derive(Debug, Clone)]
pub struct QuestionItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnswerItem {
    pub id: String,
    pub body: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

/// A pending answer joined with its question title for the review queue.
#[derive(Debug, Clone)]
pub struct PendingAnswerItem {
    pub id: String,
    pub body: String,
    pub question_title: String,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub images: Vec<String>,
}

/// Outcome of a user delete attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDeletion {
    Deleted,
    NotFound,
    /// The user still authors questions or answers; those rows are kept
    /// rather than orphaned.
    OwnsContent,
}
