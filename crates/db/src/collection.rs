//! Typed access to a single collection.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{Document, DocumentStore, FindQuery, Filter, Pipeline, StoreError};

/// Serialize a record into a store document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotADocument),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// A named collection whose documents (de)serialize as `T`.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name,
            _record: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn insert(&self, record: &T) -> Result<T, StoreError> {
        let stored = self.store.insert(self.name, to_document(record)?).await?;
        from_document(stored)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.store
            .find_by_id(self.name, id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<T>, StoreError> {
        self.store
            .find_one(self.name, filter)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn find(&self, query: &FindQuery) -> Result<Vec<T>, StoreError> {
        self.store
            .find(self.name, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.count(self.name, filter).await
    }

    /// Apply the serialized form of `patch` to the first match. `None`
    /// fields of the patch should be skipped during serialization so they
    /// leave stored values untouched.
    pub async fn update_one<P: Serialize>(
        &self,
        filter: &Filter,
        patch: &P,
    ) -> Result<Option<T>, StoreError> {
        self.store
            .update_one(self.name, filter, to_document(patch)?)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.store
            .delete_by_id(self.name, id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.delete_many(self.name, filter).await
    }

    /// Run `pipeline` and decode each output row as `R`.
    pub async fn aggregate<R: DeserializeOwned>(
        &self,
        pipeline: &Pipeline,
    ) -> Result<Vec<R>, StoreError> {
        self.store
            .aggregate(self.name, pipeline)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: String,
        body: String,
    }

    #[derive(Serialize)]
    struct NotePatch<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<&'a str>,
    }

    #[tokio::test]
    async fn typed_round_trip_through_store() {
        let notes: Collection<Note> = Collection::new(Arc::new(MemoryStore::new()), "notes");
        let note = Note {
            id: "n1".to_string(),
            body: "first".to_string(),
        };
        notes.insert(&note).await.unwrap();

        assert_eq!(notes.find_by_id("n1").await.unwrap(), Some(note));
        assert_eq!(notes.find_by_id("n2").await.unwrap(), None);

        let untouched = notes
            .update_one(&Filter::id("n1"), &NotePatch { body: None })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.body, "first");

        let updated = notes
            .update_one(&Filter::id("n1"), &NotePatch { body: Some("second") })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.body, "second");

        assert!(notes.delete_by_id("n1").await.unwrap().is_some());
        assert_eq!(notes.count(&Filter::all()).await.unwrap(), 0);
    }

    #[test]
    fn non_object_values_are_rejected() {
        assert!(matches!(to_document(&42), Err(StoreError::NotADocument)));
    }
}
