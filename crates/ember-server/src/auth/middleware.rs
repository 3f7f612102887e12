//! Bearer-token validation middleware for the HTTP API.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::auth::jwt::JwtManager;
use crate::server::error::ApiError;

/// Extract and validate the JWT from the `Authorization` header.
///
/// On success the decoded [`Claims`](crate::auth::Claims) are inserted into the
/// request extensions for handlers to pick up with `Extension<Claims>`.
pub async fn require_auth(
    State(jwt): State<Arc<JwtManager>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::AuthenticationMissing("Missing authorization header"))?;

    let claims = jwt.validate(token).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        ApiError::AuthenticationMissing("Invalid token")
    })?;

    if !claims.is_access() {
        return Err(ApiError::AuthenticationMissing("Not an access token"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Extension, middleware};
    use tower::ServiceExt;

    use crate::auth::Claims;

    fn test_jwt() -> Arc<JwtManager> {
        Arc::new(JwtManager::new(b"test-secret", 3600))
    }

    fn app(jwt: Arc<JwtManager>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(claims): Extension<Claims>| async move { claims.sub }),
            )
            .layer(middleware::from_fn_with_state(jwt, require_auth))
    }

    async fn call(jwt: Arc<JwtManager>, auth: Option<String>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let resp = app(jwt)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn valid_access_token_passes() {
        let jwt = test_jwt();
        let (token, _) = jwt.issue_access_token("u1", "alice").unwrap();

        let (status, body) = call(jwt, Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "u1");
    }

    #[tokio::test]
    async fn missing_header_fails() {
        let (status, body) = call(test_jwt(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Missing authorization header"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_fails() {
        let (status, _) = call(test_jwt(), Some("Basic dXNlcjpwYXNz".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_rejected() {
        let jwt = test_jwt();
        let (token, _) = jwt.issue_access_token("u1", "alice").unwrap();
        let mut claims = jwt.validate(&token).unwrap();
        claims.token_type = "refresh".into();
        let refresh = jwt.sign(&claims);

        let (status, body) = call(jwt, Some(format!("Bearer {refresh}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Not an access token"));
    }
}
