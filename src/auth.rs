//! Auth Module
//! API キーによるユーザー解決

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Uri},
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;
use crate::AppState;

/// API key from `Authorization: Bearer`, then `X-API-KEY`, then `?api_key`.
pub fn extract_api_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(key) = bearer {
        return Some(key.to_string());
    }

    let header = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(key) = header {
        return Some(key.to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut params)| params.remove("api_key"))
        .filter(|v| !v.trim().is_empty())
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub api_key: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(&parts.headers, &parts.uri).ok_or(AppError::Unauthorized)?;

        let user_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE api_token = ? AND is_active = 1")
                .bind(&api_key)
                .fetch_optional(&state.db)
                .await?;

        match user_id {
            Some(user_id) => Ok(AuthUser { user_id, api_key }),
            None => Err(AppError::Unauthorized),
        }
    }
}

/// Caller presenting the configured admin key in `X-Admin-Key`.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

pub fn check_admin_key(configured: Option<&str>, presented: Option<&str>) -> Result<(), AppError> {
    let Some(configured) = configured else {
        return Err(AppError::forbidden("rate-limit administration is disabled"));
    };
    match presented {
        Some(presented) if presented == configured => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        check_admin_key(state.admin_key.as_deref(), presented)?;
        Ok(AdminKey)
    }
}
