use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    NotFound,
}

/// A gateway customer. Account lifecycle (signup, OAuth login) is owned by
/// the surrounding application; the core only needs the row to anchor API
/// keys.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct CreateUser {
    pub email: String,
    pub display_name: Option<String>,
}

impl User {
    pub async fn create(pool: &SqlitePool, data: CreateUser) -> Result<Self, UserError> {
        let id = Uuid::new_v4();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name)
            VALUES (?1, ?2, ?3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.email)
        .bind(&data.display_name)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Self, UserError> {
        sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = ?1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Self, UserError> {
        sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE email = ?1"#)
            .bind(email)
            .fetch_optional(pool)
            .await?
            .ok_or(UserError::NotFound)
    }
}
