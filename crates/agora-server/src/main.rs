use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use agora_api::auth::{self, AppState, AppStateInner};
use agora_api::middleware::{identify, require_admin, require_auth};
use agora_api::{admin, ai, answers, images, questions, users};
use agora_db::Database;

/// Upload cap for multipart submissions.
const MAX_UPLOAD_BYTES: usize = 25_000_000;

const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    let jwt_secret = std::env::var("AGORA_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: AGORA_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Generate a long random value and set it in the environment or .env.");
        std::process::exit(1);
    }

    let db_path = std::env::var("AGORA_DB_PATH").unwrap_or_else(|_| "agora.db".to_string());
    let host = std::env::var("AGORA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("AGORA_PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()?;
    let upload_dir = PathBuf::from(
        std::env::var("AGORA_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
    );
    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let openai_url =
        std::env::var("AGORA_OPENAI_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());

    let db = Database::open(&PathBuf::from(&db_path))?;

    let admin_password =
        std::env::var("AGORA_ADMIN_PASSWORD").unwrap_or_else(|_| "Admin@123".to_string());
    if auth::ensure_admin(&db, &admin_password)? && admin_password == "Admin@123" {
        warn!("Default admin seeded with the default password; set AGORA_ADMIN_PASSWORD");
    }

    let image_store = images::ImageStore::new(upload_dir.clone()).await?;
    let ai_client = ai::AiClient::new(openai_key, openai_url)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        images: image_store,
        ai: ai_client,
    });

    let public_routes = Router::new()
        .route("/", get(root))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    // Reads here are public. The posting handlers in this group demand a
    // resolved viewer themselves, so anonymous creation still gets a 401.
    let content_routes = Router::new()
        .route(
            "/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/questions/{id}", get(questions::get_question))
        .route(
            "/questions/{id}/answers",
            get(answers::list_answers).post(answers::create_answer),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), identify))
        .with_state(state.clone());

    let account_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/ai/chat", post(ai::chat))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/questions", post(questions::create_question))
        .route("/admin/questions/pending", get(admin::pending_questions))
        .route("/admin/questions/{id}", delete(admin::delete_question))
        .route("/admin/questions/{id}/approve", post(admin::approve_question))
        .route("/admin/questions/{id}/reject", post(admin::reject_question))
        .route("/admin/questions/{id}/answers", post(answers::create_answer))
        .route("/admin/answers/pending", get(admin::pending_answers))
        .route("/admin/answers/{id}/approve", post(admin::approve_answer))
        .route("/admin/answers/{id}/reject", post(admin::reject_answer))
        .route("/admin/users", get(users::list_users).post(users::create_user))
        .route(
            "/admin/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(content_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Agora listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "API is running." }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
