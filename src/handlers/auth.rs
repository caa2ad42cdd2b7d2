use axum::http::HeaderMap;

use crate::db::queries;
use crate::errors::AppError;
use crate::state::AppState;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = bearer(headers).ok_or(AppError::Unauthenticated)?;
    let now = state.config.local_now();
    let db = state.db()?;
    queries::get_session_user(&db, token, &now)
        .map_err(|e| AppError::Booking(e.into()))?
        .ok_or(AppError::Unauthenticated)
}

pub fn require_admin(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    check_admin_token(bearer(headers), expected_token)
}

pub fn check_admin_token(token: Option<&str>, expected_token: &str) -> Result<(), AppError> {
    match token {
        Some(t) if !expected_token.is_empty() && t == expected_token => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
