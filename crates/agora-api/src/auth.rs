use std::sync::Arc;

use anyhow::Context;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use agora_db::Database;
use agora_db::models::UserRow;
use agora_types::api::{
    Claims, LoginRequest, LoginResponse, LoginUser, MeResponse, RegisterRequest, RegisterResponse,
};
use agora_types::models::Role;

use crate::ai::AiClient;
use crate::error::{ApiError, blocking};
use crate::images::ImageStore;

/// Issued tokens are valid for two hours.
const TOKEN_TTL_MINUTES: i64 = 120;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub images: ImageStore,
    pub ai: AiClient,
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash unreadable: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Sign a token for `user` and return it with its expiry instant.
pub fn create_token(secret: &str, user: &UserRow) -> anyhow::Result<(String, DateTime<Utc>)> {
    let sub: Uuid = user
        .id
        .parse()
        .with_context(|| format!("corrupt user id '{}'", user.id))?;
    let expires = Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES);
    let claims = Claims {
        sub,
        username: user.username.clone(),
        email: user.email.clone(),
        role: Role::parse(&user.role).unwrap_or(Role::User),
        exp: expires.timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, expires))
}

/// Seed the default admin account when the database has none. Returns true
/// when an account was created.
pub fn ensure_admin(db: &Database, password: &str) -> anyhow::Result<bool> {
    if db.count_admins()? > 0 {
        return Ok(false);
    }
    db.create_user(&UserRow {
        id: Uuid::new_v4().to_string(),
        username: "admin".to_string(),
        email: "admin@agora.local".to_string(),
        password: hash_password(password)?,
        role: Role::Admin.as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    })?;
    info!("Seeded default admin account 'admin'");
    Ok(true)
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.username.len() > 40 {
        return Err(ApiError::BadRequest(
            "Username must be 1-40 characters".to_string(),
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".to_string()));
    }
    if req.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let db = state.clone();
    let (username, email) = (req.username.clone(), req.email.clone());
    let taken = blocking(move || db.db.identity_taken(&username, &email, None)).await?;
    if taken {
        return Err(ApiError::Conflict(
            "Username or email already exists".to_string(),
        ));
    }

    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        email: req.email,
        password: hash_password(&req.password)?,
        role: Role::User.as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    let db = state.clone();
    let row = user.clone();
    blocking(move || db.db.create_user(&row)).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let db = state.clone();
    let ident = req.username_or_email.clone();
    let user = blocking(move || db.db.get_user_by_login(&ident))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&req.password, &user.password)? {
        return Err(ApiError::Unauthorized);
    }

    let (token, expires) = create_token(&state.jwt_secret, &user)?;
    Ok(Json(LoginResponse {
        token,
        expires,
        user: LoginUser {
            id: user.id,
            username: user.username,
            role: user.role,
        },
    }))
}

pub async fn me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse {
        id: claims.sub.to_string(),
        username: claims.username,
        email: claims.email,
        role: claims.role.as_str().to_string(),
    })
}
