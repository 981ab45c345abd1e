//! JSON document store on SQLite
//!
//! Every collection shares one `documents` table. The document body is kept
//! as JSON and filtered with `json_extract`, with a few expression indexes for
//! the lookups that must be fast or unique:
//!
//! - `(collection, society_id)` for society-scoped listings
//! - `(collection, $.pin)` unique, so two passes can never share a PIN even
//!   when two requests race past the existence probe
//! - `(society_id, $.date)` unique for daily attendance
//! - `$.login` unique for accounts

use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Duplicate value: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// A record persisted in the store
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    /// Owning society, indexed for scoped queries
    fn society_id(&self) -> Option<&str>;

    /// Runs before every insert and update
    fn before_save(&mut self) {}
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Text(v.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Equality filter over the society column and JSON fields
#[derive(Debug, Clone, Default)]
pub struct Filter {
    society_id: Option<String>,
    fields: Vec<(String, FieldValue)>,
    /// (array path, element field, value)
    array_matches: Vec<(String, String, String)>,
    limit: Option<i64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn society(mut self, society_id: &str) -> Self {
        self.society_id = Some(society_id.to_string());
        self
    }

    /// `path` is a dotted JSON path relative to the document root
    pub fn eq(mut self, path: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((path.to_string(), value.into()));
        self
    }

    pub fn eq_opt(self, path: &str, value: Option<impl Into<FieldValue>>) -> Self {
        match value {
            Some(v) => self.eq(path, v),
            None => self,
        }
    }

    pub fn is_null(mut self, path: &str) -> Self {
        self.fields.push((path.to_string(), FieldValue::Null));
        self
    }

    /// Some element of the array at `array` has `field` equal to `value`
    pub fn array_contains(mut self, array: &str, field: &str, value: &str) -> Self {
        self.array_matches
            .push((array.to_string(), field.to_string(), value.to_string()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn push_where<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>, collection: &'static str) {
        qb.push(" WHERE collection = ").push_bind(collection);
        if let Some(society_id) = &self.society_id {
            qb.push(" AND society_id = ").push_bind(society_id.as_str());
        }
        for (path, value) in &self.fields {
            qb.push(" AND json_extract(body, ")
                .push_bind(format!("$.{}", path))
                .push(")");
            match value {
                FieldValue::Text(s) => {
                    qb.push(" = ").push_bind(s.as_str());
                }
                FieldValue::Int(i) => {
                    qb.push(" = ").push_bind(*i);
                }
                FieldValue::Bool(b) => {
                    qb.push(" = ").push_bind(*b);
                }
                FieldValue::Null => {
                    qb.push(" IS NULL");
                }
            }
        }
        for (array, field, value) in &self.array_matches {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(body, ")
                .push_bind(format!("$.{}", array))
                .push(") WHERE json_extract(json_each.value, ")
                .push_bind(format!("$.{}", field))
                .push(") = ")
                .push_bind(value.as_str())
                .push(")");
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        tracing::info!("Connecting to database: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Single-connection in-memory database; the connection never recycles
    /// so the data lives as long as the store
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                society_id TEXT,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_society
            ON documents(collection, society_id, created_at)
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_pin
            ON documents(collection, json_extract(body, '$.pin'))
            WHERE json_extract(body, '$.pin') IS NOT NULL
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_day
            ON documents(society_id, json_extract(body, '$.date'))
            WHERE collection = 'daily_attendance'
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_login
            ON documents(json_extract(body, '$.login'))
            WHERE collection = 'accounts'
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Migrations complete");
        Ok(())
    }

    pub async fn insert<D: Document>(&self, doc: &mut D) -> Result<(), StoreError> {
        doc.before_save();
        let body = serde_json::to_string(doc)?;
        let now = timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, society_id, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(D::COLLECTION)
        .bind(doc.id())
        .bind(doc.society_id())
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Inserted {} {}", D::COLLECTION, doc.id());
        Ok(())
    }

    /// Insert two documents atomically
    pub async fn insert_pair<A: Document, B: Document>(
        &self,
        first: &mut A,
        second: &mut B,
    ) -> Result<(), StoreError> {
        first.before_save();
        second.before_save();
        let first_body = serde_json::to_string(first)?;
        let second_body = serde_json::to_string(second)?;
        let now = timestamp();

        let mut tx = self.pool.begin().await?;
        for (collection, id, society_id, body) in [
            (A::COLLECTION, first.id(), first.society_id(), &first_body),
            (B::COLLECTION, second.id(), second.society_id(), &second_body),
        ] {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, society_id, body, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(society_id)
            .bind(body)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get<D: Document>(&self, id: &str) -> Result<Option<D>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(D::COLLECTION)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Like [`get`](Self::get) but missing is an error
    pub async fn require<D: Document>(&self, id: &str) -> Result<D, StoreError> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: D::COLLECTION,
            id: id.to_string(),
        })
    }

    pub async fn save<D: Document>(&self, doc: &mut D) -> Result<(), StoreError> {
        doc.before_save();
        let body = serde_json::to_string(doc)?;

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = ?, society_id = ?, updated_at = ?
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(&body)
        .bind(doc.society_id())
        .bind(timestamp())
        .bind(D::COLLECTION)
        .bind(doc.id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: D::COLLECTION,
                id: doc.id().to_string(),
            });
        }
        Ok(())
    }

    /// Hard delete; returns whether a row existed
    pub async fn delete<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(D::COLLECTION)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Newest first
    pub async fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT body FROM documents");
        filter.push_where(&mut qb, D::COLLECTION);
        qb.push(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let bodies: Vec<String> = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one<D: Document>(&self, filter: &Filter) -> Result<Option<D>, StoreError> {
        let filter = filter.clone().limit(1);
        Ok(self.find(&filter).await?.into_iter().next())
    }

    pub async fn exists<D: Document>(&self, filter: &Filter) -> Result<bool, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT EXISTS(SELECT 1 FROM documents");
        filter.push_where(&mut qb, D::COLLECTION);
        qb.push(")");

        let found: bool = qb
            .build_query_scalar::<bool>()
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }
}
