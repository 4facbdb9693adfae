//! PostgreSQL implementation of the `DocumentStore` trait.
//!
//! Every collection lives in the single `documents` table, keyed by
//! `(collection, id)` with the document itself in a JSONB `body` column.
//! Filters are JSONB containment checks (`body @> $filter`) and patches are
//! shallow merges (`body || $patch`).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::error::Error as SqlxError;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tracing::{debug, warn};

use rollcall_storage::{
    Collection, Document, DocumentStore, Filter, FindOptions, ID_FIELD, SortOrder, StorageError,
    UpdateOutcome,
};

use crate::config::PostgresConfig;
use crate::error::PostgresError;
use crate::{migrations, pool};

/// PostgreSQL document store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    query_timeout: Duration,
}

fn into_document(body: Value) -> Result<Document, StorageError> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::internal(format!(
            "Stored body is not an object: {other}"
        ))),
    }
}

fn conflict(collection: Collection, doc: &Document) -> StorageError {
    StorageError::already_exists(collection.name(), collection.describe_key(doc))
}

impl PostgresStore {
    /// Connects, runs migrations if configured, and returns the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self::from_pool(
            pool,
            Duration::from_millis(config.query_timeout_ms),
        ))
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, PostgresError>
    where
        F: Future<Output = Result<T, SqlxError>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(PostgresError::from),
            Err(_) => Err(PostgresError::Timeout {
                millis: self.query_timeout.as_millis() as u64,
            }),
        }
    }

    async fn insert_raw(
        &self,
        collection: Collection,
        id: &str,
        doc: Document,
    ) -> Result<Value, PostgresError> {
        self.timed(
            query_scalar(
                "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) RETURNING body",
            )
            .bind(collection.name())
            .bind(id)
            .bind(Value::Object(doc))
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn patch_first(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Document,
    ) -> Result<Option<Value>, PostgresError> {
        self.timed(
            query_scalar(
                r#"UPDATE documents SET body = body || $3, updated_at = now()
                   WHERE collection = $1 AND id = (
                       SELECT id FROM documents
                       WHERE collection = $1 AND body @> $2
                       ORDER BY id LIMIT 1
                   )
                   RETURNING body"#,
            )
            .bind(collection.name())
            .bind(Value::Object(filter.to_document()))
            .bind(Value::Object(patch.clone()))
            .fetch_optional(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StorageError> {
        let body: Option<Value> = self
            .timed(
                query_scalar(
                    "SELECT body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY id LIMIT 1",
                )
                .bind(collection.name())
                .bind(Value::Object(filter.to_document()))
                .fetch_optional(&self.pool),
            )
            .await?;
        body.map(into_document).transpose()
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let (sort_field, direction) = match options.sort {
            Some(ref sort) => (
                Some(sort.field.clone()),
                match sort.order {
                    SortOrder::Ascending => "ASC NULLS FIRST",
                    SortOrder::Descending => "DESC NULLS LAST",
                },
            ),
            None => (None, "ASC"),
        };
        // A NULL limit means no limit.
        let limit = options.limit.map(|l| l as i64);
        let sql = format!(
            "SELECT body FROM documents WHERE collection = $1 AND body @> $2 \
             ORDER BY body -> $3 {direction}, id LIMIT $4"
        );

        let bodies: Vec<Value> = self
            .timed(
                query_scalar(&sql)
                    .bind(collection.name())
                    .bind(Value::Object(filter.to_document()))
                    .bind(sort_field)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;
        bodies.into_iter().map(into_document).collect()
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StorageError> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::invalid_document("document is missing a string _id"))?
            .to_string();
        let key = conflict(collection, &doc);
        match self.insert_raw(collection, &id, doc).await {
            Ok(stored) => into_document(stored),
            Err(e) if e.is_unique_violation() => Err(key),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        mut patch: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StorageError> {
        patch.remove(ID_FIELD);

        // Two rounds: a concurrent upsert may win the insert, after which
        // the second round patches the row it created.
        for round in 0..2 {
            let patched = match self.patch_first(collection, filter, &patch).await {
                Ok(patched) => patched,
                Err(e) if e.is_unique_violation() => {
                    let mut merged = filter.to_document();
                    merged.extend(patch.clone());
                    return Err(conflict(collection, &merged));
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(body) = patched {
                return Ok(UpdateOutcome::Updated(into_document(body)?));
            }
            if !upsert {
                return Ok(UpdateOutcome::NotFound);
            }

            let mut doc = filter.to_document();
            doc.extend(patch.clone());
            let id = match doc.get(ID_FIELD).and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                    id
                }
            };
            let key = conflict(collection, &doc);
            match self.insert_raw(collection, &id, doc).await {
                Ok(stored) => return Ok(UpdateOutcome::Inserted(into_document(stored)?)),
                Err(e) if e.is_unique_violation() && round == 0 => {
                    debug!(collection = %collection, "upsert lost insert race, retrying as update");
                }
                Err(e) if e.is_unique_violation() => return Err(key),
                Err(e) => return Err(e.into()),
            }
        }
        warn!(collection = %collection, "upsert did not converge");
        Err(StorageError::internal("upsert did not converge"))
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError> {
        let result = self
            .timed(
                query("DELETE FROM documents WHERE collection = $1 AND body @> $2")
                    .bind(collection.name())
                    .bind(Value::Object(filter.to_document()))
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError> {
        let count: i64 = self
            .timed(
                query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1 AND body @> $2")
                    .bind(collection.name())
                    .bind(Value::Object(filter.to_document()))
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let _: i32 = self
            .timed(query_scalar("SELECT 1").fetch_one(&self.pool))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
