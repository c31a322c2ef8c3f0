//! API key authentication extractor.
//!
//! Extracts and verifies API keys from:
//! - `Authorization: Bearer <key>` header
//! - `X-API-Key: <key>` header
//!
//! Keys are SHA-256 hashed and compared against the `api_keys` table.
//! Each key is bound to a tenant; extraction resolves the caller's
//! `tenant_id` once, and every downstream operation is scoped by it.
//! This is the identity-resolution boundary -- nothing below the HTTP
//! layer ever sees a token.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use crate::http::error::AppError;
use crate::state::AppState;

/// Authenticated tenant context. Extracting this validates the API key
/// and yields the tenant it belongs to.
pub struct TenantAuth(pub Uuid);

impl FromRequestParts<AppState> for TenantAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(parts)?;
        let tenant_id = resolve_tenant_for_key(state, &api_key).await?;
        Ok(TenantAuth(tenant_id))
    }
}

/// Look an API key up in the database and return its tenant.
///
/// Shared between the header extractor and the WebSocket endpoint's
/// `token` query parameter.
pub async fn resolve_tenant_for_key(state: &AppState, api_key: &str) -> Result<Uuid, AppError> {
    let key_hash = hash_api_key(api_key);

    let result = sqlx::query("SELECT id, tenant_id FROM api_keys WHERE key_hash = ?")
        .bind(&key_hash)
        .fetch_optional(&state.db_pool.reader)
        .await
        .map_err(|e| AppError::Internal(format!("Database error: {e}")))?;

    match result {
        Some(row) => {
            let id: String = row.get("id");
            let tenant_id: String = row.get("tenant_id");
            let tenant_id = Uuid::parse_str(&tenant_id)
                .map_err(|e| AppError::Internal(format!("Corrupt tenant_id on api key: {e}")))?;

            // Update last_used_at (best effort, don't fail the request)
            let now = chrono::Utc::now().to_rfc3339();
            let _ = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
                .bind(&now)
                .bind(&id)
                .execute(&state.db_pool.writer)
                .await;

            Ok(tenant_id)
        }
        None => Err(AppError::Unauthorized(
            "Invalid API key. Provide a valid key via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
        )),
    }
}

/// Extract the API key from request headers.
fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    // Try Authorization: Bearer <key>
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(key) = auth_str.strip_prefix("Bearer ") {
            return Ok(key.trim().to_string());
        }
    }

    // Try X-API-Key header
    if let Some(key) = parts.headers.get("x-api-key") {
        let key_str = key.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid X-API-Key header encoding".to_string())
        })?;
        return Ok(key_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        "Missing API key. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
    ))
}

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

/// Ensure at least one API key exists, bootstrapping a tenant on first run.
///
/// Returns the plaintext key (shown to the user once) when a new key was
/// generated.
pub async fn ensure_api_key(state: &AppState) -> anyhow::Result<String> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM api_keys LIMIT 1")
        .fetch_optional(&state.db_pool.reader)
        .await?;

    if existing.is_some() {
        // Key already exists, user must know it from initial creation
        return Ok("(existing key - shown only on first creation)".to_string());
    }

    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut key_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut key_bytes);
    let plaintext_key = format!(
        "parley_{}",
        key_bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
    );

    let key_hash = hash_api_key(&plaintext_key);
    let id = Uuid::now_v7().to_string();
    let tenant_id = Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO api_keys (id, tenant_id, key_hash, name, created_at) VALUES (?, ?, ?, 'default', ?)",
    )
    .bind(&id)
    .bind(&tenant_id)
    .bind(&key_hash)
    .bind(&now)
    .execute(&state.db_pool.writer)
    .await?;

    tracing::info!(%tenant_id, "bootstrapped first tenant and API key");

    Ok(plaintext_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let h1 = hash_api_key("parley_abc");
        let h2 = hash_api_key("parley_abc");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_keys_hash_differently() {
        assert_ne!(hash_api_key("parley_a"), hash_api_key("parley_b"));
    }
}
