//! In-process document store.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, FieldKind, FindResult, Query, Sort, StoreError, lookup, value_number, value_text};

/// Documents per collection, kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(Uuid, Value)>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|(existing, _)| *existing == id) {
            return Err(StoreError::Duplicate { collection: collection.to_string(), id });
        }
        docs.push((id, body));
        Ok(())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|(existing, _)| *existing == id))
            .map(|(_, body)| body.clone()))
    }

    async fn replace(&self, collection: &str, id: Uuid, body: Value) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(existing, _)| *existing == id));
        match slot {
            Some((_, existing)) => {
                *existing = body;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_if(
        &self,
        collection: &str,
        id: Uuid,
        field: &'static str,
        expected: &Value,
        body: Value,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(existing, _)| *existing == id));
        match slot {
            Some((_, existing)) if lookup(existing, field) == Some(expected) => {
                *existing = body;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|(existing, _)| *existing != id);
        Ok(docs.len() != before)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<FindResult, StoreError> {
        let collections = self.collections.read().await;
        let mut matched: Vec<&Value> = collections
            .get(collection)
            .map(|docs| docs.iter().map(|(_, body)| body).filter(|b| query.filter.matches(b)).collect())
            .unwrap_or_default();

        // Field sorts break ties newest first, like the SQL backend.
        match query.sort {
            Sort::Newest => matched.reverse(),
            Sort::Oldest => {}
            Sort::Ascending(field, kind) => {
                matched.reverse();
                matched.sort_by(|a, b| compare_field(a, b, field, kind, false));
            }
            Sort::Descending(field, kind) => {
                matched.reverse();
                matched.sort_by(|a, b| compare_field(a, b, field, kind, true));
            }
        }

        let total = i64::try_from(matched.len()).unwrap_or(i64::MAX);
        let documents = match query.page {
            Some(page) => matched
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect(),
            None => matched.into_iter().cloned().collect(),
        };
        Ok(FindResult { documents, total })
    }
}

/// Documents without the field sort last in either direction (`NULLS LAST`).
fn compare_field(a: &Value, b: &Value, field: &str, kind: FieldKind, descending: bool) -> Ordering {
    let (a, b) = (lookup(a, field), lookup(b, field));
    let ordered = |ord: Ordering| if descending { ord.reverse() } else { ord };
    match kind {
        FieldKind::Number => match (a.and_then(value_number), b.and_then(value_number)) {
            (Some(a), Some(b)) => ordered(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        FieldKind::Text => match (a.map(value_text), b.map(value_text)) {
            (Some(a), Some(b)) => ordered(a.cmp(&b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Filter, Page};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (name, price, status) in [("Scarf", "250.00", "active"), ("Kurta", "1299.00", "active"), ("Saree", "899.50", "draft")] {
            store
                .insert("products", Uuid::new_v4(), json!({"name": name, "price": {"amount": price}, "status": status}))
                .await
                .unwrap();
        }
        store
    }

    fn names(result: &FindResult) -> Vec<&str> {
        result.documents.iter().map(|d| d["name"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_find_sorts_and_pages() {
        let store = seeded().await;

        let newest = store.find("products", &Query::default()).await.unwrap();
        assert_eq!(names(&newest), ["Saree", "Kurta", "Scarf"]);

        let cheapest = Query::default().sorted(Sort::Ascending("price.amount", FieldKind::Number));
        assert_eq!(names(&store.find("products", &cheapest).await.unwrap()), ["Scarf", "Saree", "Kurta"]);

        let page = Query::new(Filter::new().eq("status", "active"))
            .sorted(Sort::Descending("price.amount", FieldKind::Number))
            .paged(Page { limit: 1, offset: 1 });
        let result = store.find("products", &page).await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(names(&result), ["Scarf"]);
    }

    #[tokio::test]
    async fn test_missing_sort_field_goes_last_both_ways() {
        let store = seeded().await;
        store.insert("products", Uuid::new_v4(), json!({"name": "Gift card", "status": "active"})).await.unwrap();

        let asc = Query::default().sorted(Sort::Ascending("price.amount", FieldKind::Number));
        assert_eq!(names(&store.find("products", &asc).await.unwrap()), ["Scarf", "Saree", "Kurta", "Gift card"]);
        let desc = Query::default().sorted(Sort::Descending("price.amount", FieldKind::Number));
        assert_eq!(names(&store.find("products", &desc).await.unwrap()), ["Kurta", "Saree", "Scarf", "Gift card"]);
        let by_status = Query::default().sorted(Sort::Descending("missing", FieldKind::Text));
        assert_eq!(names(&store.find("products", &by_status).await.unwrap()), ["Gift card", "Saree", "Kurta", "Scarf"]);
    }

    #[tokio::test]
    async fn test_replace_if_checks_the_stored_value() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert("orders", id, json!({"status": "pending_payment"})).await.unwrap();

        let pending = json!("pending_payment");
        assert!(store.replace_if("orders", id, "status", &pending, json!({"status": "paid", "by": 1})).await.unwrap());
        assert!(!store.replace_if("orders", id, "status", &pending, json!({"status": "paid", "by": 2})).await.unwrap());
        assert_eq!(store.get("orders", id).await.unwrap().unwrap()["by"], 1);
        assert!(!store.replace_if("orders", Uuid::new_v4(), "status", &pending, json!({})).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(!store.replace("c", id, json!({})).await.unwrap());
        store.insert("c", id, json!({"v": 1})).await.unwrap();
        assert!(matches!(store.insert("c", id, json!({})).await, Err(StoreError::Duplicate { .. })));
        assert!(store.replace("c", id, json!({"v": 2})).await.unwrap());
        assert_eq!(store.get("c", id).await.unwrap().unwrap()["v"], 2);
        assert!(store.delete("c", id).await.unwrap());
        assert!(store.get("c", id).await.unwrap().is_none());
    }
}
