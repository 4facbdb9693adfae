use std::collections::BTreeMap;

use async_trait::async_trait;
use rollcall_storage::{
    Collection, Document, DocumentStore, Filter, FindOptions, ID_FIELD, StorageError,
    UpdateOutcome,
};
use serde_json::Value;
use tokio::sync::RwLock;

type Table = RwLock<BTreeMap<String, Document>>;

/// In-memory document store.
///
/// Each collection is a `BTreeMap` keyed by `_id` behind its own `RwLock`.
/// Every mutating call holds the write lock for its whole duration, so
/// unique-key checks and upserts are atomic per collection.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    students: Table,
    attendance: Table,
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Whether `candidate` collides with `existing` on the collection's unique key.
fn same_unique_key(collection: Collection, existing: &Document, candidate: &Document) -> bool {
    collection
        .unique_key()
        .iter()
        .all(|field| existing.get(*field).is_some() && existing.get(*field) == candidate.get(*field))
}

fn find_id(table: &BTreeMap<String, Document>, filter: &Filter) -> Option<String> {
    if let Some(Value::String(id)) = filter.value_of(ID_FIELD) {
        return table
            .get(id)
            .filter(|doc| filter.matches(doc))
            .map(|_| id.clone());
    }
    table
        .iter()
        .find(|(_, doc)| filter.matches(doc))
        .map(|(id, _)| id.clone())
}

impl InMemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, collection: Collection) -> &Table {
        match collection {
            Collection::Students => &self.students,
            Collection::Attendance => &self.attendance,
        }
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: Collection) -> usize {
        self.table(collection).read().await.len()
    }

    fn check_unique(
        collection: Collection,
        table: &BTreeMap<String, Document>,
        candidate: &Document,
        skip_id: Option<&str>,
    ) -> Result<(), StorageError> {
        let clash = table
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != skip_id)
            .any(|(id, doc)| {
                Some(id.as_str()) == id_of(candidate) || same_unique_key(collection, doc, candidate)
            });
        if clash {
            return Err(StorageError::already_exists(
                collection.name(),
                collection.describe_key(candidate),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StorageError> {
        let table = self.table(collection).read().await;
        Ok(find_id(&table, filter).and_then(|id| table.get(&id).cloned()))
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let table = self.table(collection).read().await;
        let mut docs: Vec<Document> = table
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        if let Some(ref sort) = options.sort {
            // Stable sort keeps `_id` order for ties.
            docs.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StorageError> {
        let id = id_of(&doc)
            .ok_or_else(|| StorageError::invalid_document("document is missing a string _id"))?
            .to_string();
        let mut table = self.table(collection).write().await;
        Self::check_unique(collection, &table, &doc, None)?;
        table.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        mut patch: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StorageError> {
        // The primary key is immutable.
        patch.remove(ID_FIELD);

        let mut table = self.table(collection).write().await;
        match find_id(&table, filter) {
            Some(id) => {
                let mut updated = table.get(&id).cloned().unwrap_or_default();
                updated.extend(patch);
                Self::check_unique(collection, &table, &updated, Some(&id))?;
                table.insert(id, updated.clone());
                Ok(UpdateOutcome::Updated(updated))
            }
            None if upsert => {
                let mut doc = filter.to_document();
                doc.extend(patch);
                let id = match doc.get(ID_FIELD).and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                        id
                    }
                };
                Self::check_unique(collection, &table, &doc, None)?;
                table.insert(id, doc.clone());
                Ok(UpdateOutcome::Inserted(doc))
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError> {
        let mut table = self.table(collection).write().await;
        let before = table.len();
        table.retain(|_, doc| !filter.matches(doc));
        Ok((before - table.len()) as u64)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError> {
        let table = self.table(collection).read().await;
        Ok(table.values().filter(|doc| filter.matches(doc)).count() as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
