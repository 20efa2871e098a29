use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use agora_types::api::Claims;
use agora_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;

/// Resolved caller of a public read path: anonymous unless the request
/// carried a valid bearer token.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub claims: Option<Claims>,
}

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.claims.as_ref().is_some_and(|c| c.role == Role::Admin)
    }
}

fn bearer_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Resolve the caller when a token is present, otherwise pass through as an
/// anonymous viewer. Never rejects; handlers that mutate check the viewer.
pub async fn identify(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let viewer = Viewer {
        claims: bearer_claims(req.headers(), &state.jwt_secret),
    };
    req.extensions_mut().insert(viewer);
    next.run(req).await
}

/// Reject the request unless it carries a valid token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims =
        bearer_claims(req.headers(), &state.jwt_secret).ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(Viewer {
        claims: Some(claims.clone()),
    });
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Reject the request unless the token carries the admin role.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims =
        bearer_claims(req.headers(), &state.jwt_secret).ok_or(ApiError::Unauthorized)?;
    if claims.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    req.extensions_mut().insert(Viewer {
        claims: Some(claims.clone()),
    });
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
