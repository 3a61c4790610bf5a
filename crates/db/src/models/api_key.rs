use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("API key not found")]
    NotFound,
}

/// A caller credential plus the LinkedIn session material the extension
/// mirrors into it. The plaintext secret is never stored; only its SHA-256
/// hex digest and a short display prefix survive generation.
///
/// `linkedin_cookies` and `gemini_credentials` are JSON text columns. The
/// cookie blob is a flat `name -> value` object; the gemini blob is opaque
/// to the LinkedIn path and merely carried through.
#[derive(Debug, Clone, FromRow, Serialize, TS)]
#[ts(export)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_prefix: String,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub key_hash: String,
    pub instance_id: String,
    pub instance_name: Option<String>,
    pub browser_info: Option<String>,
    pub active: bool,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub csrf_token: Option<String>,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub linkedin_cookies: Option<String>,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub gemini_credentials: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CreateApiKey {
    pub user_id: Uuid,
    pub key_prefix: String,
    pub key_hash: String,
    pub instance_id: String,
    pub instance_name: Option<String>,
    pub browser_info: Option<String>,
}

impl ApiKey {
    pub async fn create(pool: &SqlitePool, data: CreateApiKey) -> Result<Self, ApiKeyError> {
        let id = Uuid::new_v4();
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (
                id, user_id, key_prefix, key_hash,
                instance_id, instance_name, browser_info
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.user_id)
        .bind(&data.key_prefix)
        .bind(&data.key_hash)
        .bind(&data.instance_id)
        .bind(&data.instance_name)
        .bind(&data.browser_info)
        .fetch_one(pool)
        .await?;

        Ok(key)
    }

    /// Hash lookup for authentication. Returns `None` for unknown and revoked
    /// keys alike; the caller decides what that means.
    pub async fn find_active_by_hash(
        pool: &SqlitePool,
        key_hash: &str,
    ) -> Result<Option<Self>, ApiKeyError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"SELECT * FROM api_keys WHERE key_hash = ?1 AND active = 1"#,
        )
        .bind(key_hash)
        .fetch_optional(pool)
        .await?;

        Ok(key)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, ApiKeyError> {
        let key = sqlx::query_as::<_, ApiKey>(r#"SELECT * FROM api_keys WHERE id = ?1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(key)
    }

    /// The key whose embedded credentials serve a user's direct-mode
    /// requests. Newest active key wins when several instances exist.
    pub async fn find_active_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Option<Self>, ApiKeyError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys
            WHERE user_id = ?1 AND active = 1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(key)
    }

    pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, ApiKeyError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"SELECT * FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(keys)
    }

    /// Soft-delete every active key for one browser install. Run before
    /// inserting the replacement so at most one key per (user, instance)
    /// stays active.
    pub async fn deactivate_for_instance(
        pool: &SqlitePool,
        user_id: Uuid,
        instance_id: &str,
    ) -> Result<u64, ApiKeyError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET active = 0, revoked_at = datetime('now', 'subsec')
            WHERE user_id = ?1 AND instance_id = ?2 AND active = 1
            "#,
        )
        .bind(user_id)
        .bind(instance_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn revoke(pool: &SqlitePool, id: Uuid) -> Result<(), ApiKeyError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET active = 0, revoked_at = datetime('now', 'subsec')
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }

        Ok(())
    }

    pub async fn touch_last_used(pool: &SqlitePool, id: Uuid) -> Result<(), ApiKeyError> {
        sqlx::query(
            r#"UPDATE api_keys SET last_used_at = datetime('now', 'subsec') WHERE id = ?1"#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_csrf_token(
        pool: &SqlitePool,
        id: Uuid,
        csrf_token: &str,
    ) -> Result<(), ApiKeyError> {
        let result = sqlx::query(r#"UPDATE api_keys SET csrf_token = ?2 WHERE id = ?1"#)
            .bind(id)
            .bind(csrf_token)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }

        Ok(())
    }

    pub async fn update_cookies(
        pool: &SqlitePool,
        id: Uuid,
        cookies_json: &str,
    ) -> Result<(), ApiKeyError> {
        let result = sqlx::query(r#"UPDATE api_keys SET linkedin_cookies = ?2 WHERE id = ?1"#)
            .bind(id)
            .bind(cookies_json)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }

        Ok(())
    }

    pub async fn update_gemini_credentials(
        pool: &SqlitePool,
        id: Uuid,
        gemini_json: &str,
    ) -> Result<(), ApiKeyError> {
        let result = sqlx::query(r#"UPDATE api_keys SET gemini_credentials = ?2 WHERE id = ?1"#)
            .bind(id)
            .bind(gemini_json)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }

        Ok(())
    }

    /// Parsed cookie jar, name-sorted. An unreadable blob is treated as
    /// empty rather than failing a fetch that may still work over proxy.
    pub fn cookies(&self) -> BTreeMap<String, String> {
        let Some(raw) = self.linkedin_cookies.as_deref() else {
            return BTreeMap::new();
        };

        match serde_json::from_str::<BTreeMap<String, String>>(raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("unreadable cookie blob for key {}: {}", self.id, e);
                BTreeMap::new()
            }
        }
    }

    pub fn gemini(&self) -> Option<serde_json::Value> {
        self.gemini_credentials
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_utils::{create_test_user, setup_test_pool};

    fn key_data(user_id: Uuid, instance_id: &str, hash: &str) -> CreateApiKey {
        CreateApiKey {
            user_id,
            key_prefix: "LKG_a1b2".into(),
            key_hash: hash.into(),
            instance_id: instance_id.into(),
            instance_name: Some("Chrome on macOS".into()),
            browser_info: Some("Chrome 126".into()),
        }
    }

    #[tokio::test]
    async fn create_and_lookup_by_hash() {
        let pool = setup_test_pool().await;
        let user_id = create_test_user(&pool).await;

        let created = ApiKey::create(&pool, key_data(user_id, "inst-1", "hash-1"))
            .await
            .expect("failed to create key");
        assert!(created.active);
        assert!(created.revoked_at.is_none());

        let found = ApiKey::find_active_by_hash(&pool, "hash-1")
            .await
            .expect("lookup failed")
            .expect("key missing");
        assert_eq!(found.id, created.id);

        let unknown = ApiKey::find_active_by_hash(&pool, "hash-unknown")
            .await
            .expect("lookup failed");
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn deactivation_hides_key_from_auth() {
        let pool = setup_test_pool().await;
        let user_id = create_test_user(&pool).await;

        let first = ApiKey::create(&pool, key_data(user_id, "inst-1", "hash-1"))
            .await
            .expect("create failed");

        let rows = ApiKey::deactivate_for_instance(&pool, user_id, "inst-1")
            .await
            .expect("deactivate failed");
        assert_eq!(rows, 1);

        assert!(
            ApiKey::find_active_by_hash(&pool, "hash-1")
                .await
                .expect("lookup failed")
                .is_none()
        );

        let revoked = ApiKey::find_by_id(&pool, first.id)
            .await
            .expect("lookup failed")
            .expect("row gone");
        assert!(!revoked.active);
        assert!(revoked.revoked_at.is_some());
    }

    #[tokio::test]
    async fn newest_active_key_serves_credentials() {
        let pool = setup_test_pool().await;
        let user_id = create_test_user(&pool).await;

        ApiKey::create(&pool, key_data(user_id, "inst-1", "hash-1"))
            .await
            .expect("create failed");
        let newer = ApiKey::create(&pool, key_data(user_id, "inst-2", "hash-2"))
            .await
            .expect("create failed");

        let active = ApiKey::find_active_for_user(&pool, user_id)
            .await
            .expect("lookup failed")
            .expect("no active key");
        assert_eq!(active.id, newer.id);

        let listed = ApiKey::list_for_user(&pool, user_id).await.expect("list failed");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn credential_columns_round_trip() {
        let pool = setup_test_pool().await;
        let user_id = create_test_user(&pool).await;

        let key = ApiKey::create(&pool, key_data(user_id, "inst-1", "hash-1"))
            .await
            .expect("create failed");

        ApiKey::update_csrf_token(&pool, key.id, "ajax:123456")
            .await
            .expect("csrf update failed");
        ApiKey::update_cookies(&pool, key.id, r#"{"li_at":"AQED","JSESSIONID":"ajax:123456"}"#)
            .await
            .expect("cookie update failed");
        ApiKey::update_gemini_credentials(&pool, key.id, r#"{"api_key":"AIza"}"#)
            .await
            .expect("gemini update failed");

        let stored = ApiKey::find_by_id(&pool, key.id)
            .await
            .expect("lookup failed")
            .expect("row gone");
        assert_eq!(stored.csrf_token.as_deref(), Some("ajax:123456"));

        let cookies = stored.cookies();
        assert_eq!(cookies.get("li_at").map(String::as_str), Some("AQED"));
        // BTreeMap iteration is name-sorted, which the Cookie header relies on.
        let names: Vec<&String> = cookies.keys().collect();
        assert_eq!(names, vec!["JSESSIONID", "li_at"]);

        let gemini = stored.gemini().expect("gemini blob missing");
        assert_eq!(gemini["api_key"], "AIza");
    }

    #[tokio::test]
    async fn revoke_missing_key_errors() {
        let pool = setup_test_pool().await;
        let result = ApiKey::revoke(&pool, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ApiKeyError::NotFound)));
    }
}
