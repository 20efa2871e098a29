//! Admin-side user management, including the guard rails that keep the
//! instance administrable: the last admin can be neither demoted nor
//! deleted, and admins cannot delete themselves.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use agora_db::models::{UserDeletion, UserRow};
use agora_types::api::{Claims, CreateUserRequest, UpdateUserRequest, UserSummary};
use agora_types::models::Role;

use crate::auth::{AppState, hash_password};
use crate::error::{ApiError, blocking};

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let db = state.clone();
    let search = query.search.filter(|s| !s.trim().is_empty());
    let users = blocking(move || db.db.list_users(search.as_deref())).await?;
    Ok(Json(users.into_iter().map(user_summary).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserSummary>, ApiError> {
    let db = state.clone();
    let user_id = id.to_string();
    let user = blocking(move || db.db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user_summary(user)))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let username = req.username.trim().to_string();
    validate_username(&username)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    let db = state.clone();
    let (check_name, check_email) = (username.clone(), email.clone());
    if blocking(move || db.db.identity_taken(&check_name, &check_email, None)).await? {
        return Err(ApiError::Conflict(
            "Email or Username already exists.".to_string(),
        ));
    }

    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        password: hash_password(&req.password)?,
        role: req.role.as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    let db = state.clone();
    let stored = row.clone();
    blocking(move || db.db.create_user(&stored)).await?;

    Ok((StatusCode::CREATED, Json(user_summary(row))))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = id.to_string();
    let db = state.clone();
    let lookup = user_id.clone();
    let target = blocking(move || db.db.get_user_by_id(&lookup))
        .await?
        .ok_or(ApiError::NotFound)?;

    let username = req.username.trim().to_string();
    validate_username(&username)?;
    let email = normalize_email(&req.email)?;

    let db = state.clone();
    let (check_name, check_email, exclude) = (username.clone(), email.clone(), user_id.clone());
    if blocking(move || db.db.identity_taken(&check_name, &check_email, Some(&exclude))).await? {
        return Err(ApiError::Conflict(
            "Email or Username already exists.".to_string(),
        ));
    }

    if target.role == Role::Admin.as_str() && req.role != Role::Admin {
        let db = state.clone();
        let check = user_id.clone();
        if blocking(move || db.db.count_other_admins(&check)).await? == 0 {
            return Err(ApiError::Policy(
                "Cannot demote the last remaining admin.".to_string(),
            ));
        }
    }

    let password_hash = match req.new_password.as_deref().map(str::trim) {
        Some(plain) if !plain.is_empty() => {
            validate_password(plain)?;
            Some(hash_password(plain)?)
        }
        _ => None,
    };

    let db = state.clone();
    let role = req.role.as_str().to_string();
    let updated = blocking(move || {
        db.db
            .update_user(&user_id, &username, &email, &role, password_hash.as_deref())
    })
    .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if claims.sub == id {
        return Err(ApiError::Policy(
            "Admins cannot delete their own account.".to_string(),
        ));
    }

    let user_id = id.to_string();
    let db = state.clone();
    let lookup = user_id.clone();
    let target = blocking(move || db.db.get_user_by_id(&lookup))
        .await?
        .ok_or(ApiError::NotFound)?;

    if target.role == Role::Admin.as_str() {
        let db = state.clone();
        let check = user_id.clone();
        if blocking(move || db.db.count_other_admins(&check)).await? == 0 {
            return Err(ApiError::Policy(
                "Cannot delete the last remaining admin.".to_string(),
            ));
        }
    }

    let db = state.clone();
    match blocking(move || db.db.delete_user(&user_id)).await? {
        UserDeletion::Deleted => Ok(StatusCode::NO_CONTENT),
        UserDeletion::NotFound => Err(ApiError::NotFound),
        UserDeletion::OwnsContent => Err(ApiError::Conflict(
            "User still owns questions or answers".to_string(),
        )),
    }
}

fn user_summary(user: UserRow) -> UserSummary {
    UserSummary {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        created_at: user.created_at,
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 30 {
        return Err(ApiError::BadRequest(
            "Username must be 3-30 characters.".to_string(),
        ));
    }
    Ok(())
}

fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 128 {
        return Err(ApiError::BadRequest("A valid email is required.".to_string()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 || password.len() > 100 {
        return Err(ApiError::BadRequest(
            "Password must be 8-100 characters.".to_string(),
        ));
    }
    Ok(())
}
