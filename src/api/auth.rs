use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::handlers::AppError;
use crate::AppState;
use crate::config::AuthMode;
use crate::error::DashboardError;

/// Guards API routes with the static bearer token when bearer mode is on
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.settings.http.auth.mode {
        AuthMode::None => next.run(request).await,
        AuthMode::Bearer => match check_bearer(&state, &request) {
            Ok(()) => next.run(request).await,
            Err(e) => AppError::from(e).into_response(),
        },
    }
}

fn check_bearer(state: &AppState, request: &Request) -> Result<(), DashboardError> {
    let Some(expected) = state.bearer_token.as_deref() else {
        tracing::error!("bearer auth enabled but no token was loaded at startup");
        return Err(DashboardError::Internal("auth misconfigured".into()));
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => {
            tracing::warn!("invalid bearer token");
            Err(DashboardError::Unauthorized("invalid bearer token".into()))
        }
        None => {
            tracing::warn!("missing or invalid Authorization header");
            Err(DashboardError::Unauthorized("missing bearer token".into()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
