//! Document storage.
//!
//! Every aggregate is stored as a JSON document in a named collection. Two
//! backends implement [`DocumentStore`]:
//!
//! - [`PgStore`] keeps documents in a single `documents` table as `JSONB`
//! - [`MemoryStore`] keeps them in process, for local runs and tests
//!
//! Services go through the typed [`Collection`] wrapper.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Announcement, Banner, Category, Order, Product, User};

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("document {id} already exists in {collection}")]
    Duplicate { collection: String, id: Uuid },
}

/// A type stored in its own collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
    fn document_id(&self) -> Uuid;
}

impl Document for Product {
    const COLLECTION: &'static str = "products";
    fn document_id(&self) -> Uuid { self.id() }
}

impl Document for Category {
    const COLLECTION: &'static str = "categories";
    fn document_id(&self) -> Uuid { self.id }
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    fn document_id(&self) -> Uuid { self.id() }
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";
    fn document_id(&self) -> Uuid { self.id() }
}

impl Document for Announcement {
    const COLLECTION: &'static str = "announcements";
    fn document_id(&self) -> Uuid { self.id }
}

impl Document for Banner {
    const COLLECTION: &'static str = "banners";
    fn document_id(&self) -> Uuid { self.id }
}

/// A single filter condition. Field names are dotted paths into the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the JSON value.
    Eq { field: &'static str, value: Value },
    /// Case-insensitive substring match on any of the fields.
    Search { fields: Vec<&'static str>, term: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition. Values that fail to serialize match nothing.
    #[must_use]
    pub fn eq(mut self, field: &'static str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.conditions.push(Condition::Eq { field, value });
        self
    }

    /// Adds a search condition; blank terms are ignored.
    #[must_use]
    pub fn search(mut self, fields: &[&'static str], term: &str) -> Self {
        let term = term.trim();
        if !term.is_empty() {
            self.conditions.push(Condition::Search { fields: fields.to_vec(), term: term.to_string() });
        }
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluates the filter against a document held in memory.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|cond| match cond {
            Condition::Eq { field, value } => lookup(doc, field).is_some_and(|v| v == value),
            Condition::Search { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    lookup(doc, field).is_some_and(|v| value_text(v).to_lowercase().contains(&needle))
                })
            }
        })
    }
}

/// How the value at a sort field should be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    /// Most recently inserted first.
    #[default]
    Newest,
    Oldest,
    Ascending(&'static str, FieldKind),
    Descending(&'static str, FieldKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// One-based page number to limit/offset.
    pub fn number(page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        Self { limit: per_page, offset: (page - 1).saturating_mul(per_page) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Sort,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self { filter, ..Self::default() }
    }

    #[must_use]
    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

/// One page of raw documents plus the number of matches overall.
#[derive(Debug, Clone, Default)]
pub struct FindResult {
    pub documents: Vec<Value>,
    pub total: i64,
}

/// Storage backend holding JSON documents in named collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<(), StoreError>;
    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError>;
    /// Returns false when no document has this id.
    async fn replace(&self, collection: &str, id: Uuid, body: Value) -> Result<bool, StoreError>;
    /// Replaces the document only while the stored value at `field` still
    /// equals `expected`. Returns false when it has changed or the document
    /// is gone.
    async fn replace_if(
        &self,
        collection: &str,
        id: Uuid,
        field: &'static str,
        expected: &Value,
        body: Value,
    ) -> Result<bool, StoreError>;
    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;
    async fn find(&self, collection: &str, query: &Query) -> Result<FindResult, StoreError>;
}

/// Typed access to the collection of `T`.
pub struct Collection<'a, T> {
    store: &'a dyn DocumentStore,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Document> Collection<'a, T> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store, _marker: PhantomData }
    }

    pub async fn insert(&self, doc: &T) -> Result<(), StoreError> {
        self.store.insert(T::COLLECTION, doc.document_id(), serde_json::to_value(doc)?).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the stored document. Returns false when it no longer exists.
    pub async fn save(&self, doc: &T) -> Result<bool, StoreError> {
        self.store.replace(T::COLLECTION, doc.document_id(), serde_json::to_value(doc)?).await
    }

    /// Overwrites the stored document if `field` still holds `expected`.
    pub async fn save_if(&self, doc: &T, field: &'static str, expected: impl Serialize) -> Result<bool, StoreError> {
        let expected = serde_json::to_value(expected)?;
        self.store
            .replace_if(T::COLLECTION, doc.document_id(), field, &expected, serde_json::to_value(doc)?)
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.store.delete(T::COLLECTION, id).await
    }

    pub async fn find(&self, query: &Query) -> Result<(Vec<T>, i64), StoreError> {
        let result = self.store.find(T::COLLECTION, query).await?;
        let docs = result
            .documents
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok((docs, result.total))
    }

    pub async fn all(&self, filter: Filter, sort: Sort) -> Result<Vec<T>, StoreError> {
        Ok(self.find(&Query::new(filter).sorted(sort)).await?.0)
    }

    pub async fn find_one(&self, filter: Filter) -> Result<Option<T>, StoreError> {
        let query = Query::new(filter).paged(Page { limit: 1, offset: 0 });
        Ok(self.find(&query).await?.0.into_iter().next())
    }

    pub async fn count(&self, filter: Filter) -> Result<i64, StoreError> {
        let query = Query::new(filter).paged(Page { limit: 0, offset: 0 });
        Ok(self.store.find(T::COLLECTION, &query).await?.total)
    }
}

fn lookup<'v>(doc: &'v Value, field: &str) -> Option<&'v Value> {
    field.split('.').try_fold(doc, |v, key| v.get(key))
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
