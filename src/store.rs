//! Persistent file store backed by PostgreSQL.
//!
//! Only metadata is stored; file bytes stay on Telegram and are referenced
//! through the opaque transport file handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, AppResult};
use crate::session::UserId;

/// Sender identity, upserted on interaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Fields of a file record about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub user_id: UserId,
    pub file_handle: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub description: Option<String>,
}

/// A stored file record
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: i64,
    pub user_id: UserId,
    pub file_handle: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Aggregate usage for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStats {
    pub count: i64,
    pub total_size: i64,
}

/// Operations the file-storage flow needs from persistence
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Insert or overwrite the user's profile with last-seen values
    async fn upsert_user(&self, user: &UserProfile) -> AppResult<()>;

    async fn add_file(&self, file: &NewFile) -> AppResult<i64>;

    /// All files of `user_id`, newest first
    async fn list_files(&self, user_id: UserId) -> AppResult<Vec<StoredFile>>;

    async fn get_file(&self, id: i64, user_id: UserId) -> AppResult<Option<StoredFile>>;

    /// `true` when a row owned by `user_id` was deleted
    async fn delete_file(&self, id: i64, user_id: UserId) -> AppResult<bool>;

    async fn file_stats(&self, user_id: UserId) -> AppResult<FileStats>;
}

/// PostgreSQL implementation of [`FileStore`]
#[derive(Debug, Clone)]
pub struct PgFileStore {
    pool: PgPool,
    files_table: String,
}

/// Connect a pool using the configured limits
pub async fn connect_pool(config: &DatabaseConfig) -> AppResult<PgPool> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(url)
        .await?;
    Ok(pool)
}

impl PgFileStore {
    /// `files_table` must already be validated as a plain identifier.
    pub fn new(pool: PgPool, files_table: impl Into<String>) -> Self {
        Self {
            pool,
            files_table: files_table.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_database_schema(&self) -> AppResult<()> {
        info!(files_table = %self.files_table, "Initializing database schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                user_id BIGINT PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                joined_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                file_handle TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size BIGINT NOT NULL,
                uploaded_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                description TEXT
            )",
            table = self.files_table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_user_uploaded_idx ON {table} (user_id, uploaded_at DESC)",
            table = self.files_table
        ))
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    fn row_to_file(row: &sqlx::postgres::PgRow) -> StoredFile {
        StoredFile {
            id: row.get(0),
            user_id: row.get(1),
            file_handle: row.get(2),
            file_name: row.get(3),
            file_type: row.get(4),
            file_size: row.get(5),
            uploaded_at: row.get(6),
            description: row.get(7),
        }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn upsert_user(&self, user: &UserProfile) -> AppResult<()> {
        debug!(user_id = %user.id, "Upserting user");

        sqlx::query(
            "INSERT INTO users (user_id, username, first_name, last_name)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
                username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_file(&self, file: &NewFile) -> AppResult<i64> {
        debug!(user_id = %file.user_id, file_name = %file.file_name, "Storing file record");

        let row = sqlx::query(&format!(
            "INSERT INTO {} (user_id, file_handle, file_name, file_type, file_size, description)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            self.files_table
        ))
        .bind(file.user_id)
        .bind(&file.file_handle)
        .bind(&file.file_name)
        .bind(&file.file_type)
        .bind(file.file_size)
        .bind(&file.description)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get(0);
        info!(user_id = %file.user_id, file_id = %id, "File record created");
        Ok(id)
    }

    async fn list_files(&self, user_id: UserId) -> AppResult<Vec<StoredFile>> {
        let rows = sqlx::query(&format!(
            "SELECT id, user_id, file_handle, file_name, file_type, file_size, uploaded_at, description
             FROM {} WHERE user_id = $1 ORDER BY uploaded_at DESC, id DESC",
            self.files_table
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let files: Vec<StoredFile> = rows.iter().map(Self::row_to_file).collect();
        debug!(user_id = %user_id, count = files.len(), "Listed files");
        Ok(files)
    }

    async fn get_file(&self, id: i64, user_id: UserId) -> AppResult<Option<StoredFile>> {
        let row = sqlx::query(&format!(
            "SELECT id, user_id, file_handle, file_name, file_type, file_size, uploaded_at, description
             FROM {} WHERE id = $1 AND user_id = $2",
            self.files_table
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_file))
    }

    async fn delete_file(&self, id: i64, user_id: UserId) -> AppResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            self.files_table
        ))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(user_id = %user_id, file_id = %id, "File record deleted");
        } else {
            info!(user_id = %user_id, file_id = %id, "No file record to delete");
        }
        Ok(deleted)
    }

    async fn file_stats(&self, user_id: UserId) -> AppResult<FileStats> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0)::BIGINT FROM {} WHERE user_id = $1",
            self.files_table
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(FileStats {
            count: row.get(0),
            total_size: row.get(1),
        })
    }
}
