use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use agora_db::models::{QuestionItem, QuestionRow};
use agora_types::api::{QuestionDetailResponse, QuestionListResponse, QuestionResponse};
use agora_types::models::Status;

use crate::answers::answer_response;
use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::images::{collect_multipart, store_images};
use crate::middleware::Viewer;

pub(crate) const MAX_TITLE_LEN: usize = 140;
pub(crate) const MAX_BODY_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Free-text search over title and body.
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Admins may ask to see unapproved content as well.
    #[serde(default)]
    pub include_pending: bool,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

/// Post a question (multipart: `title`, `text`, repeated `files`).
/// Admin-authored questions go live immediately; everyone else's wait for
/// review.
pub async fn create_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let claims = viewer.claims.ok_or(ApiError::Unauthorized)?;
    let (mut fields, files) = collect_multipart(multipart).await?;
    let title = fields.remove("title").unwrap_or_default();
    let body = fields.remove("text").unwrap_or_default();
    if title.trim().is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title must be 1-{MAX_TITLE_LEN} characters"
        )));
    }
    if body.trim().is_empty() || body.len() > MAX_BODY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Text must be 1-{MAX_BODY_LEN} characters"
        )));
    }

    let question_id = Uuid::new_v4().to_string();
    let images = store_images(&state.images, &files, Some(&question_id), None).await?;
    let row = QuestionRow {
        id: question_id,
        title,
        body,
        author_id: claims.sub.to_string(),
        status: Status::initial_for(claims.role).as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    let db = state.clone();
    let (question, image_rows) = (row.clone(), images.clone());
    blocking(move || db.db.insert_question(&question, &image_rows)).await?;

    let response = QuestionResponse {
        id: row.id,
        title: row.title,
        body: row.body,
        author: claims.username,
        status: row.status,
        created_at: row.created_at,
        images: images.iter().map(|img| format!("/{}", img.path)).collect(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_questions(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<ListQuery>,
) -> Result<Json<QuestionListResponse>, ApiError> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 100);
    let include_hidden = viewer.is_admin() && query.include_pending;
    let search = query.q.filter(|s| !s.trim().is_empty());

    let db = state.clone();
    let (total, items) =
        blocking(move || db.db.list_questions(search.as_deref(), include_hidden, page, page_size))
            .await?;

    Ok(Json(QuestionListResponse {
        total,
        page,
        page_size,
        items: items.into_iter().map(question_response).collect(),
    }))
}

pub async fn get_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionDetailResponse>, ApiError> {
    let db = state.clone();
    let include_hidden = viewer.is_admin();
    let question_id = id.to_string();
    let (question, answers) =
        blocking(move || db.db.get_question_detail(&question_id, include_hidden))
            .await?
            .ok_or(ApiError::NotFound)?;

    Ok(Json(QuestionDetailResponse {
        question: question_response(question),
        answers: answers.into_iter().map(answer_response).collect(),
    }))
}

pub(crate) fn question_response(item: QuestionItem) -> QuestionResponse {
    QuestionResponse {
        id: item.id,
        title: item.title,
        body: item.body,
        author: item.author,
        status: item.status,
        created_at: item.created_at,
        images: item.images.into_iter().map(|p| format!("/{p}")).collect(),
    }
}
