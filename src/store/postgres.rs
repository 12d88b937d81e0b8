//! `PostgreSQL` document store on a single `JSONB` table.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Condition, DocumentStore, FieldKind, Filter, FindResult, Query, Sort, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection or a migration fails.
    pub async fn connect(database_url: &SecretString) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, collection: &'a str, filter: &'a Filter) {
    qb.push(" FROM documents WHERE collection = ");
    qb.push_bind(collection);
    for condition in filter.conditions() {
        match condition {
            Condition::Eq { field, value } => {
                qb.push(" AND body #> ");
                qb.push_bind(path(field));
                qb.push(" = ");
                qb.push_bind(Json(value));
            }
            Condition::Search { fields, term } => {
                let pattern = format!("%{}%", escape_like(term));
                qb.push(" AND (");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push("body #>> ");
                    qb.push_bind(path(field));
                    qb.push(" ILIKE ");
                    qb.push_bind(pattern.clone());
                }
                qb.push(")");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(Json(body))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::Duplicate { collection: collection.to_string(), id }
                }
                other => StoreError::Database(other),
            })?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let row: Option<(Json<Value>,)> =
            sqlx::query_as("SELECT body FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(body),)| body))
    }

    async fn replace(&self, collection: &str, id: Uuid, body: Value) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET body = $3, updated_at = NOW() WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(body))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_if(
        &self,
        collection: &str,
        id: Uuid,
        field: &'static str,
        expected: &Value,
        body: Value,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET body = $3, updated_at = NOW() \
             WHERE collection = $1 AND id = $2 AND body #> $4 = $5",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(body))
        .bind(path(field))
        .bind(Json(expected))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<FindResult, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        push_filter(&mut count, collection, &query.filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        if query.page.is_some_and(|p| p.limit == 0) {
            return Ok(FindResult { documents: vec![], total });
        }

        let mut select = QueryBuilder::<Postgres>::new("SELECT body");
        push_filter(&mut select, collection, &query.filter);
        match query.sort {
            Sort::Newest => {
                select.push(" ORDER BY created_at DESC, id DESC");
            }
            Sort::Oldest => {
                select.push(" ORDER BY created_at ASC, id ASC");
            }
            Sort::Ascending(field, kind) | Sort::Descending(field, kind) => {
                let direction = if matches!(query.sort, Sort::Ascending(..)) { "ASC" } else { "DESC" };
                select.push(" ORDER BY (body #>> ");
                select.push_bind(path(field));
                select.push(match kind {
                    FieldKind::Number => ")::numeric ",
                    FieldKind::Text => ") ",
                });
                select.push(direction);
                select.push(" NULLS LAST, created_at DESC");
            }
        }
        if let Some(page) = query.page {
            select.push(" LIMIT ");
            select.push_bind(i64::from(page.limit));
            select.push(" OFFSET ");
            select.push_bind(i64::from(page.offset));
        }

        let rows: Vec<(Json<Value>,)> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok(FindResult { documents: rows.into_iter().map(|(Json(body),)| body).collect(), total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_escape() {
        assert_eq!(path("price.amount"), vec!["price".to_string(), "amount".to_string()]);
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
