use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use uuid::Uuid;

use agora_db::models::{AnswerItem, AnswerRow};
use agora_types::api::{AnswerCreatedResponse, AnswerResponse};
use agora_types::models::Status;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::images::{collect_multipart, store_images};
use crate::middleware::Viewer;
use crate::questions::MAX_BODY_LEN;

/// Post an answer to a question (multipart: `text`, repeated `files`).
/// 404 when the question does not exist. The question's own status does not
/// matter; answering hidden content is allowed and moderated on its own.
pub async fn create_answer(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let claims = viewer.claims.ok_or(ApiError::Unauthorized)?;
    let question_id = id.to_string();

    let db = state.clone();
    let lookup = question_id.clone();
    let exists = blocking(move || db.db.question_exists(&lookup)).await?;
    if !exists {
        return Err(ApiError::NotFound);
    }

    let (mut fields, files) = collect_multipart(multipart).await?;
    let body = fields.remove("text").unwrap_or_default();
    if body.trim().is_empty() || body.len() > MAX_BODY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Text must be 1-{MAX_BODY_LEN} characters"
        )));
    }

    let answer_id = Uuid::new_v4().to_string();
    let images = store_images(&state.images, &files, None, Some(&answer_id)).await?;
    let row = AnswerRow {
        id: answer_id,
        question_id,
        author_id: claims.sub.to_string(),
        body,
        status: Status::initial_for(claims.role).as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    let db = state.clone();
    let (answer, image_rows) = (row.clone(), images.clone());
    blocking(move || db.db.insert_answer(&answer, &image_rows)).await?;

    Ok((
        StatusCode::CREATED,
        Json(AnswerCreatedResponse {
            id: row.id,
            body: row.body,
            status: row.status,
            created_at: row.created_at,
            images: images.iter().map(|img| format!("/{}", img.path)).collect(),
        }),
    ))
}

/// Answers of one question, oldest first. An unknown question id yields an
/// empty list rather than a 404.
pub async fn list_answers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AnswerResponse>>, ApiError> {
    let db = state.clone();
    let include_hidden = viewer.is_admin();
    let question_id = id.to_string();
    let answers = blocking(move || db.db.list_answers(&question_id, include_hidden)).await?;
    Ok(Json(answers.into_iter().map(answer_response).collect()))
}

pub(crate) fn answer_response(item: AnswerItem) -> AnswerResponse {
    AnswerResponse {
        id: item.id,
        body: item.body,
        author: item.author,
        status: item.status,
        created_at: item.created_at,
        images: item.images.into_iter().map(|p| format!("/{p}")).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, header};
    use tempfile::TempDir;

    use agora_db::Database;
    use agora_db::models::{QuestionRow, UserRow};
    use agora_types::api::Claims;
    use agora_types::models::Role;

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

    fn seed_claims(state: &AppState, role: Role) -> Claims {
        let id = Uuid::new_v4();
        state
            .db
            .create_user(&UserRow {
                id: id.to_string(),
                username: "alice".to_string(),
                email: "alice@example.test".to_string(),
                password: "hash".to_string(),
                role: role.as_str().to_string(),
                created_at: Utc::now().to_rfc3339(),
            })
            .unwrap();
        Claims {
            sub: id,
            username: "alice".to_string(),
            email: "alice@example.test".to_string(),
            role,
            exp: 4102444800,
        }
    }

    fn seed_question(state: &AppState, author: &Claims) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .insert_question(
                &QuestionRow {
                    id: id.to_string(),
                    title: "title".to_string(),
                    body: "body".to_string(),
                    author_id: author.sub.to_string(),
                    status: Status::Approved.as_str().to_string(),
                    created_at: Utc::now().to_rfc3339(),
                },
                &[],
            )
            .unwrap();
        id
    }

    async fn multipart_from(parts: &[(&str, Option<&str>, &str)]) -> Multipart {
        const BOUNDARY: &str = "test-boundary";
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn signed_in(claims: Claims) -> Extension<Viewer> {
        Extension(Viewer {
            claims: Some(claims),
        })
    }

    #[tokio::test]
    async fn posting_an_answer_stores_content_and_images() {
        let (_dir, state) = test_state().await;
        let claims = seed_claims(&state, Role::User);
        let question = seed_question(&state, &claims);
        let multipart = multipart_from(&[
            ("text", None, "Have you tried WAL mode?"),
            ("files", Some("bench.png"), "png bytes"),
        ])
        .await;

        let created = create_answer(
            State(state.clone()),
            signed_in(claims),
            Path(question),
            multipart,
        )
        .await;
        assert!(created.is_ok());

        let answers = state.db.list_answers(&question.to_string(), true).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].body, "Have you tried WAL mode?");
        assert_eq!(answers[0].status, "pending");
        assert_eq!(answers[0].images.len(), 1);
    }

    #[tokio::test]
    async fn answering_an_unknown_question_is_not_found() {
        let (_dir, state) = test_state().await;
        let claims = seed_claims(&state, Role::Admin);
        let multipart = multipart_from(&[("text", None, "into the void")]).await;

        let Err(err) = create_answer(
            State(state.clone()),
            signed_in(claims),
            Path(Uuid::new_v4()),
            multipart,
        )
        .await
        else {
            panic!("answering a missing question should fail");
        };
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn blank_answers_are_rejected() {
        let (_dir, state) = test_state().await;
        let claims = seed_claims(&state, Role::User);
        let question = seed_question(&state, &claims);
        let multipart = multipart_from(&[("text", None, "   ")]).await;

        let Err(err) = create_answer(
            State(state.clone()),
            signed_in(claims),
            Path(question),
            multipart,
        )
        .await
        else {
            panic!("blank answer should be rejected");
        };
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
