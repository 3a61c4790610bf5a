use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;

use super::user::{CreateUser, User};

pub(crate) async fn setup_test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:?cache=shared")
        .expect("invalid sqlite config")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("failed to open sqlite memory db");

    bootstrap_schema(&pool).await;

    pool
}

async fn bootstrap_schema(pool: &SqlitePool) {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            BLOB PRIMARY KEY,
            email         TEXT NOT NULL UNIQUE,
            display_name  TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now', 'subsec')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now', 'subsec'))
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id                  BLOB PRIMARY KEY,
            user_id             BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            key_prefix          TEXT NOT NULL,
            key_hash            TEXT NOT NULL UNIQUE,
            instance_id         TEXT NOT NULL,
            instance_name       TEXT,
            browser_info        TEXT,
            active              INTEGER NOT NULL DEFAULT 1,
            csrf_token          TEXT,
            linkedin_cookies    TEXT,
            gemini_credentials  TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now', 'subsec')),
            last_used_at        TEXT,
            revoked_at          TEXT
        );
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("failed to bootstrap schema");
    }
}

pub(crate) async fn create_test_user(pool: &SqlitePool) -> Uuid {
    let user = User::create(
        pool,
        CreateUser {
            email: format!("user-{}@example.com", Uuid::new_v4()),
            display_name: Some("Test User".into()),
        },
    )
    .await
    .expect("failed to create test user");

    user.id
}
