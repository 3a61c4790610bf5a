use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use db::models::api_key::{ApiKey, ApiKeyError, CreateApiKey};

/// Display/auth prefix of every gateway key: `LKG_<prefix>_<secret>`.
pub const KEY_SCHEME: &str = "LKG";

const PREFIX_LEN: usize = 8;
const SECRET_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Database(#[from] ApiKeyError),
    #[error("no active API key holds credentials for this user")]
    NoActiveKey,
}

/// The session material a direct-mode LinkedIn call needs, as currently
/// mirrored by the extension. The gemini blob rides along untouched.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub csrf_token: Option<String>,
    pub cookies: BTreeMap<String, String>,
    pub gemini: Option<serde_json::Value>,
}

impl Credentials {
    pub fn from_key(key: &ApiKey) -> Self {
        Self {
            csrf_token: key.csrf_token.clone(),
            cookies: key.cookies(),
            gemini: key.gemini(),
        }
    }

    /// `Cookie:` header value. BTreeMap iteration keeps it name-sorted and
    /// therefore stable across runs.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Authentication result as data, not exceptions: an unknown key and a
/// malformed one are ordinary outcomes the REST surface maps to 401.
#[derive(Debug)]
pub enum AuthOutcome {
    Found(ApiKey),
    NotFound,
    Invalid,
}

/// Returned exactly once from key generation; the plaintext is not
/// reconstructible from storage afterwards.
#[derive(Debug)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub record: ApiKey,
}

/// Owns API-key records and the credential blobs embedded in them. All
/// credential writes for one key serialize through that key's lock, so a
/// `get_credentials` that starts after an update completes sees the whole
/// update or none of it.
pub struct CredentialRegistry {
    pool: SqlitePool,
    server_execution_enabled: bool,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    generation_lock: Mutex<()>,
}

impl CredentialRegistry {
    pub fn new(pool: SqlitePool, server_execution_enabled: bool) -> Self {
        Self {
            pool,
            server_execution_enabled,
            locks: DashMap::new(),
            generation_lock: Mutex::new(()),
        }
    }

    /// Whether this edition may run LinkedIn calls from the gateway process
    /// itself (`server_call=true`).
    pub fn server_execution_allowed(&self) -> bool {
        self.server_execution_enabled
    }

    fn random_token(len: usize) -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn hash_key(plaintext: &str) -> String {
        hex::encode(Sha256::digest(plaintext.as_bytes()))
    }

    fn key_lock(&self, key_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(key_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Issue a fresh key for one browser install. Any previously active key
    /// for the same `(user, instance)` pair is soft-revoked first, so at
    /// most one stays active.
    pub async fn generate_key(
        &self,
        user_id: Uuid,
        instance_id: &str,
        instance_name: Option<String>,
        browser_info: Option<String>,
    ) -> Result<GeneratedKey, CredentialError> {
        let prefix = Self::random_token(PREFIX_LEN);
        let secret = Self::random_token(SECRET_LEN);
        let plaintext = format!("{}_{}_{}", KEY_SCHEME, prefix, secret);
        let key_hash = Self::hash_key(&plaintext);

        // Deactivate-then-insert must not interleave with another generate,
        // or two keys for the same (user, instance) could both end up active.
        let _guard = self.generation_lock.lock().await;
        let displaced = ApiKey::deactivate_for_instance(&self.pool, user_id, instance_id).await?;
        if displaced > 0 {
            tracing::info!(
                "rotated {} prior key(s) for user {} instance {}",
                displaced,
                user_id,
                instance_id
            );
        }

        let record = ApiKey::create(
            &self.pool,
            CreateApiKey {
                user_id,
                key_prefix: format!("{}_{}", KEY_SCHEME, prefix),
                key_hash,
                instance_id: instance_id.to_string(),
                instance_name,
                browser_info,
            },
        )
        .await?;

        Ok(GeneratedKey { plaintext, record })
    }

    pub async fn authenticate(&self, presented: &str) -> Result<AuthOutcome, CredentialError> {
        if !presented.starts_with(KEY_SCHEME) || presented.split('_').count() < 3 {
            return Ok(AuthOutcome::Invalid);
        }

        let hash = Self::hash_key(presented);
        match ApiKey::find_active_by_hash(&self.pool, &hash).await? {
            Some(key) => {
                ApiKey::touch_last_used(&self.pool, key.id).await?;
                Ok(AuthOutcome::Found(key))
            }
            None => Ok(AuthOutcome::NotFound),
        }
    }

    pub async fn get_credentials(&self, user_id: Uuid) -> Result<Credentials, CredentialError> {
        let key = ApiKey::find_active_for_user(&self.pool, user_id)
            .await?
            .ok_or(CredentialError::NoActiveKey)?;
        Ok(Credentials::from_key(&key))
    }

    pub async fn update_csrf(&self, user_id: Uuid, token: &str) -> Result<(), CredentialError> {
        let key = self.active_key(user_id).await?;
        let lock = self.key_lock(key.id);
        let _guard = lock.lock().await;
        ApiKey::update_csrf_token(&self.pool, key.id, strip_cookie_quotes(token)).await?;
        Ok(())
    }

    pub async fn update_cookies(
        &self,
        user_id: Uuid,
        cookies: HashMap<String, String>,
    ) -> Result<(), CredentialError> {
        let key = self.active_key(user_id).await?;

        // LinkedIn wraps some values (JSESSIONID notably) in double quotes;
        // strip one surrounding pair on the way in.
        let cleaned: BTreeMap<String, String> = cookies
            .into_iter()
            .map(|(name, value)| {
                let stripped = strip_cookie_quotes(&value).to_string();
                (name, stripped)
            })
            .collect();
        let blob = serde_json::to_string(&cleaned).unwrap_or_else(|_| "{}".to_string());

        let lock = self.key_lock(key.id);
        let _guard = lock.lock().await;
        ApiKey::update_cookies(&self.pool, key.id, &blob).await?;
        Ok(())
    }

    pub async fn update_gemini(
        &self,
        user_id: Uuid,
        blob: serde_json::Value,
    ) -> Result<(), CredentialError> {
        let key = self.active_key(user_id).await?;
        let lock = self.key_lock(key.id);
        let _guard = lock.lock().await;
        ApiKey::update_gemini_credentials(&self.pool, key.id, &blob.to_string()).await?;
        Ok(())
    }

    pub async fn delete_key(&self, key_id: Uuid) -> Result<(), CredentialError> {
        ApiKey::revoke(&self.pool, key_id).await?;
        self.locks.remove(&key_id);
        Ok(())
    }

    pub async fn list_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, CredentialError> {
        Ok(ApiKey::list_for_user(&self.pool, user_id).await?)
    }

    pub async fn find_key(&self, key_id: Uuid) -> Result<Option<ApiKey>, CredentialError> {
        Ok(ApiKey::find_by_id(&self.pool, key_id).await?)
    }

    async fn active_key(&self, user_id: Uuid) -> Result<ApiKey, CredentialError> {
        ApiKey::find_active_for_user(&self.pool, user_id)
            .await?
            .ok_or(CredentialError::NoActiveKey)
    }
}

/// Remove one surrounding pair of double quotes, if present.
pub fn strip_cookie_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
