//! Moderation endpoints. Everything here sits behind the admin middleware;
//! the handlers only deal with the content itself.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use agora_types::api::{ModerationResponse, PendingAnswer, QuestionResponse};
use agora_types::models::Status;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::questions::question_response;

pub async fn approve_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, ApiError> {
    set_question_status(state, id, Status::Approved).await
}

/// Rejecting a question only flips its status; its images stay until the
/// question itself is deleted.
pub async fn reject_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, ApiError> {
    set_question_status(state, id, Status::Rejected).await
}

async fn set_question_status(
    state: AppState,
    id: Uuid,
    status: Status,
) -> Result<Json<ModerationResponse>, ApiError> {
    let db = state.clone();
    let question_id = id.to_string();
    let found = blocking(move || db.db.set_question_status(&question_id, status)).await?;
    if !found {
        return Err(ApiError::NotFound);
    }
    Ok(Json(ModerationResponse {
        id: id.to_string(),
        status: status.as_str().to_string(),
    }))
}

pub async fn approve_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, ApiError> {
    let db = state.clone();
    let answer_id = id.to_string();
    let found =
        blocking(move || db.db.set_answer_status(&answer_id, Status::Approved)).await?;
    if !found {
        return Err(ApiError::NotFound);
    }
    Ok(Json(ModerationResponse {
        id: id.to_string(),
        status: Status::Approved.as_str().to_string(),
    }))
}

/// Rejecting an answer also removes its images, rows first (one
/// transaction), then the blobs best-effort.
pub async fn reject_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, ApiError> {
    let db = state.clone();
    let answer_id = id.to_string();
    let removed = blocking(move || db.db.reject_answer(&answer_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    for path in &removed {
        state.images.remove(path).await;
    }

    Ok(Json(ModerationResponse {
        id: id.to_string(),
        status: Status::Rejected.as_str().to_string(),
    }))
}

/// Delete a question with its answers and every attached image.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    let question_id = id.to_string();
    let removed = blocking(move || db.db.delete_question(&question_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    for path in &removed {
        state.images.remove(path).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn pending_questions(
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let db = state.clone();
    let items = blocking(move || db.db.pending_questions()).await?;
    Ok(Json(items.into_iter().map(question_response).collect()))
}

pub async fn pending_answers(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingAnswer>>, ApiError> {
    let db = state.clone();
    let items = blocking(move || db.db.pending_answers()).await?;
    Ok(Json(
        items
            .into_iter()
            .map(|item| PendingAnswer {
                id: item.id,
                body: item.body,
                question_title: item.question_title,
                author: item.author,
                status: item.status,
                created_at: item.created_at,
                images: item.images.into_iter().map(|p| format!("/{p}")).collect(),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agora_db::Database;
    use agora_db::models::{AnswerRow, ImageRow, QuestionRow, UserRow};
    use agora_types::models::Role;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::ai::AiClient;
    use crate::auth::AppStateInner;
    use crate::images::ImageStore;

    async fn test_state() -> (TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let images = ImageStore::new(dir.path().join("uploads")).await.unwrap();
        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: "test-secret".to_string(),
            images,
            ai: AiClient::new(String::new(), "http://127.0.0.1:9".to_string()).unwrap(),
        });
        (dir, state)
    }

    fn seed_user(state: &AppState) -> String {
        let id = Uuid::new_v4().to_string();
        state
            .db
            .create_user(&UserRow {
                id: id.clone(),
                username: "alice".to_string(),
                email: "alice@example.test".to_string(),
                password: "hash".to_string(),
                role: Role::User.as_str().to_string(),
                created_at: Utc::now().to_rfc3339(),
            })
            .unwrap();
        id
    }

    fn seed_question(state: &AppState, author: &str, images: &[ImageRow]) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .insert_question(
                &QuestionRow {
                    id: id.to_string(),
                    title: "title".to_string(),
                    body: "body".to_string(),
                    author_id: author.to_string(),
                    status: Status::Pending.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                images,
            )
            .unwrap();
        id
    }

    fn seed_answer(state: &AppState, question: Uuid, author: &str, images: &[ImageRow]) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .insert_answer(
                &AnswerRow {
                    id: id.to_string(),
                    question_id: question.to_string(),
                    author_id: author.to_string(),
                    body: "an answer".to_string(),
                    status: Status::Pending.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                images,
            )
            .unwrap();
        id
    }

    async fn stored_image(state: &AppState, answer: Option<Uuid>, question: Option<Uuid>) -> ImageRow {
        let path = state.images.save(Some("pic.png"), b"png bytes").await.unwrap();
        ImageRow {
            id: Uuid::new_v4().to_string(),
            path,
            question_id: question.map(|q| q.to_string()),
            answer_id: answer.map(|a| a.to_string()),
            uploaded_at: Utc::now().to_rfc3339(),
        }
    }

    fn blob_path(dir: &TempDir, stored: &str) -> std::path::PathBuf {
        let name = stored.strip_prefix("uploads/").unwrap();
        dir.path().join("uploads").join(name)
    }

    #[tokio::test]
    async fn approving_twice_stays_approved() {
        let (_dir, state) = test_state().await;
        let author = seed_user(&state);
        let question = seed_question(&state, &author, &[]);

        let first = approve_question(State(state.clone()), Path(question)).await.unwrap();
        assert_eq!(first.0.status, "approved");
        let second = approve_question(State(state.clone()), Path(question)).await.unwrap();
        assert_eq!(second.0.status, "approved");
    }

    #[tokio::test]
    async fn moderating_missing_content_is_not_found() {
        let (_dir, state) = test_state().await;
        let missing = Uuid::new_v4();

        let err = approve_question(State(state.clone()), Path(missing)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        let err = reject_answer(State(state.clone()), Path(missing)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        let err = delete_question(State(state.clone()), Path(missing)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn rejecting_an_answer_removes_rows_and_blobs() {
        let (dir, state) = test_state().await;
        let author = seed_user(&state);
        let question = seed_question(&state, &author, &[]);
        let answer = Uuid::new_v4();
        let image = stored_image(&state, Some(answer), None).await;
        let blob = blob_path(&dir, &image.path);
        state
            .db
            .insert_answer(
                &AnswerRow {
                    id: answer.to_string(),
                    question_id: question.to_string(),
                    author_id: author.clone(),
                    body: "with image".to_string(),
                    status: Status::Pending.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                &[image],
            )
            .unwrap();
        assert!(blob.exists());

        let response = reject_answer(State(state.clone()), Path(answer)).await.unwrap();
        assert_eq!(response.0.status, "rejected");
        assert!(!blob.exists());

        let answers = state.db.list_answers(&question.to_string(), true).unwrap();
        assert_eq!(answers[0].status, "rejected");
        assert!(answers[0].images.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_question_removes_everything() {
        let (dir, state) = test_state().await;
        let author = seed_user(&state);
        let question = Uuid::new_v4();
        let question_image = stored_image(&state, None, Some(question)).await;
        let question_blob = blob_path(&dir, &question_image.path);
        state
            .db
            .insert_question(
                &QuestionRow {
                    id: question.to_string(),
                    title: "t".to_string(),
                    body: "b".to_string(),
                    author_id: author.clone(),
                    status: Status::Approved.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                &[question_image],
            )
            .unwrap();

        let answer = Uuid::new_v4();
        let answer_image = stored_image(&state, Some(answer), None).await;
        let answer_blob = blob_path(&dir, &answer_image.path);
        state
            .db
            .insert_answer(
                &AnswerRow {
                    id: answer.to_string(),
                    question_id: question.to_string(),
                    author_id: author.clone(),
                    body: "a".to_string(),
                    status: Status::Approved.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                &[answer_image],
            )
            .unwrap();

        let status = delete_question(State(state.clone()), Path(question)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!question_blob.exists());
        assert!(!answer_blob.exists());
        assert!(
            state
                .db
                .get_question_detail(&question.to_string(), true)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn queues_list_only_pending_content() {
        let (_dir, state) = test_state().await;
        let author = seed_user(&state);
        let question = seed_question(&state, &author, &[]);
        seed_answer(&state, question, &author, &[]);
        approve_question(State(state.clone()), Path(question)).await.unwrap();

        let questions = pending_questions(State(state.clone())).await.unwrap();
        assert!(questions.0.is_empty());

        let answers = pending_answers(State(state.clone())).await.unwrap();
        assert_eq!(answers.0.len(), 1);
        assert_eq!(answers.0[0].question_title, "title");
        assert_eq!(answers.0[0].author, "alice");
    }
}
