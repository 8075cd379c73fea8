//! In-process document store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Number, Value};
use tokio::sync::RwLock;

use crate::filter::{sort_documents, FindQuery};
use crate::pipeline::{Pipeline, Projection, Stage};
use crate::{Document, DocumentStore, Filter, IndexSpec, StoreError, ID_FIELD};

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Document>>,
    indexes: HashMap<String, Vec<IndexSpec>>,
}

impl State {
    fn documents(&self, collection: &str) -> &[Document] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reject `candidate` if it collides with another document on `_id` or on
    /// a unique index. `skip` is the position of the document being replaced.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        let unique_fields = self
            .indexes
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|index| index.unique)
            .map(|index| (index.name, index.field));
        let fields = std::iter::once(("_id_", ID_FIELD)).chain(unique_fields);

        for (name, field) in fields {
            let Some(value) = candidate.get(field) else {
                continue;
            };
            let collides = self
                .documents(collection)
                .iter()
                .enumerate()
                .any(|(position, existing)| Some(position) != skip && existing.get(field) == Some(value));
            if collides {
                return Err(StoreError::Duplicate {
                    collection: collection.to_string(),
                    index: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn run(&self, collection: &str, pipeline: &Pipeline) -> Vec<Document> {
        let mut documents = self.documents(collection).to_vec();

        for stage in pipeline.stages() {
            match stage {
                Stage::Match(filter) => documents.retain(|document| filter.matches(document)),
                Stage::Sort(keys) => sort_documents(&mut documents, keys),
                Stage::Skip(count) => {
                    let count = usize::try_from(*count).unwrap_or(usize::MAX);
                    documents.drain(..count.min(documents.len()));
                }
                Stage::Limit(count) => {
                    documents.truncate(usize::try_from(*count).unwrap_or(usize::MAX));
                }
                Stage::Lookup {
                    from,
                    local_field,
                    foreign_field,
                    as_field,
                } => {
                    let foreign = self.documents(from);
                    for document in &mut documents {
                        let local = document.get(local_field).cloned().unwrap_or(Value::Null);
                        let joined = foreign
                            .iter()
                            .filter(|other| other.get(foreign_field).unwrap_or(&Value::Null) == &local)
                            .cloned()
                            .map(Value::Object)
                            .collect();
                        document.insert(as_field.clone(), Value::Array(joined));
                    }
                }
                Stage::Average {
                    input,
                    field,
                    output,
                } => {
                    for document in &mut documents {
                        let values: Vec<f64> = document
                            .get(input)
                            .and_then(Value::as_array)
                            .into_iter()
                            .flatten()
                            .filter_map(|item| item.get(field).and_then(Value::as_f64))
                            .collect();
                        let mean = if values.is_empty() {
                            Value::Null
                        } else {
                            let mean = values.iter().sum::<f64>() / values.len() as f64;
                            Number::from_f64(mean).map_or(Value::Null, Value::Number)
                        };
                        document.insert(output.clone(), mean);
                    }
                }
                Stage::Project(projections) => {
                    for document in &mut documents {
                        *document = project(document, projections);
                    }
                }
            }
        }

        documents
    }
}

fn project(document: &Document, projections: &[Projection]) -> Document {
    let mut projected = Document::new();
    if let Some(id) = document.get(ID_FIELD) {
        projected.insert(ID_FIELD.to_string(), id.clone());
    }
    for projection in projections {
        match projection {
            Projection::Field(field) => {
                if let Some(value) = document.get(field) {
                    projected.insert(field.clone(), value.clone());
                }
            }
            Projection::OrElse { field, fallback } => {
                let value = match document.get(field) {
                    Some(Value::Null) | None => fallback.clone(),
                    Some(value) => value.clone(),
                };
                projected.insert(field.clone(), value);
            }
        }
    }
    projected
}

/// Insertion-ordered collections behind a single `RwLock`.
///
/// Every call takes the lock once, so a pipeline sees a consistent snapshot
/// while separate calls (for example a count followed by an aggregate) do not.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let indexes = state.indexes.entry(index.collection.to_string()).or_default();
        if !indexes.iter().any(|existing| existing.name == index.name) {
            indexes.push(index.clone());
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<Document, StoreError> {
        if !document.get(ID_FIELD).is_some_and(Value::is_string) {
            return Err(StoreError::MissingId);
        }
        let mut state = self.state.write().await;
        state.check_unique(collection, &document, None)?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.find_one(collection, &Filter::id(id)).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents(collection)
            .iter()
            .find(|document| filter.matches(document))
            .cloned())
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents(collection)
            .iter()
            .filter(|document| query.filter.matches(document))
            .cloned()
            .collect();
        sort_documents(&mut documents, &query.sort);

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(documents.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        let count = state
            .documents(collection)
            .iter()
            .filter(|document| filter.matches(document))
            .count();
        Ok(count as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut state = self.state.write().await;
        let Some(position) = state
            .documents(collection)
            .iter()
            .position(|document| filter.matches(document))
        else {
            return Ok(None);
        };

        let mut updated = state.documents(collection)[position].clone();
        for (field, value) in changes {
            if field != ID_FIELD {
                updated.insert(field, value);
            }
        }
        state.check_unique(collection, &updated, Some(position))?;

        if let Some(documents) = state.collections.get_mut(collection) {
            documents[position] = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let mut state = self.state.write().await;
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(None);
        };
        let filter = Filter::id(id);
        Ok(documents
            .iter()
            .position(|document| filter.matches(document))
            .map(|position| documents.remove(position)))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|document| !filter.matches(document));
        Ok((before - documents.len()) as u64)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state.run(collection, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SortOrder;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, title) in [("b1", "Dune"), ("b2", "Emma"), ("b3", "Dune Messiah")] {
            store
                .insert("books", doc(json!({"_id": id, "title": title})))
                .await
                .unwrap();
        }
        for (id, book, rating) in [("r1", "b1", 5), ("r2", "b1", 3), ("r3", "b3", 4)] {
            store
                .insert(
                    "reviews",
                    doc(json!({"_id": id, "book": book, "rating": rating})),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn insert_requires_string_id() {
        let store = MemoryStore::new();
        let result = store.insert("books", doc(json!({"title": "x"}))).await;
        assert!(matches!(result, Err(StoreError::MissingId)));
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .ensure_index(&IndexSpec::unique("users", "users_email_unique", "email"))
            .await
            .unwrap();
        store
            .insert("users", doc(json!({"_id": "u1", "email": "a@b.io"})))
            .await
            .unwrap();

        let duplicate = store
            .insert("users", doc(json!({"_id": "u2", "email": "a@b.io"})))
            .await;
        assert!(duplicate.unwrap_err().is_duplicate());
        assert_eq!(store.count("users", &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_applies_sort_skip_and_limit() {
        let store = seeded().await;
        let query = FindQuery::new(Filter::all())
            .sort_by("title", SortOrder::Descending)
            .skip(1)
            .limit(1);
        let found = store.find("books", &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["title"], json!("Dune Messiah"));
    }

    #[tokio::test]
    async fn update_one_merges_changes_when_filter_matches() {
        let store = seeded().await;
        let updated = store
            .update_one(
                "reviews",
                &Filter::id("r1").and(Filter::eq("rating", 5)),
                doc(json!({"rating": 2, "_id": "ignored"})),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["rating"], json!(2));
        assert_eq!(updated["_id"], json!("r1"));

        let stale = store
            .update_one(
                "reviews",
                &Filter::id("r1").and(Filter::eq("rating", 5)),
                doc(json!({"rating": 1})),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn delete_many_removes_matching_documents() {
        let store = seeded().await;
        let removed = store
            .delete_many("reviews", &Filter::eq("book", "b1"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("reviews", &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pipeline_joins_averages_and_projects() {
        let store = seeded().await;
        let pipeline = Pipeline::new()
            .matching(Filter::contains_ignore_case("title", "dune"))
            .sort_by("_id", SortOrder::Ascending)
            .lookup("reviews", "_id", "book", "reviews")
            .average("reviews", "rating", "averageRating")
            .project(vec![
                Projection::field("title"),
                Projection::or_else("averageRating", "N/A"),
            ]);

        let rows = store.aggregate("books", &pipeline).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], json!("b1"));
        assert_eq!(rows[0]["averageRating"], json!(4.0));
        assert_eq!(rows[1]["averageRating"], json!(4.0));
        assert!(rows[0].get("reviews").is_none());
    }

    #[tokio::test]
    async fn pipeline_marks_unreviewed_documents() {
        let store = seeded().await;
        let pipeline = Pipeline::new()
            .matching(Filter::eq("_id", "b2"))
            .lookup("reviews", "_id", "book", "reviews")
            .average("reviews", "rating", "averageRating")
            .project(vec![Projection::or_else("averageRating", "N/A")]);

        let rows = store.aggregate("books", &pipeline).await.unwrap();
        assert_eq!(rows[0]["averageRating"], json!("N/A"));
    }

    #[tokio::test]
    async fn pipeline_window_skips_then_limits() {
        let store = seeded().await;
        let pipeline = Pipeline::new().skip(1).limit(5);
        let rows = store.aggregate("books", &pipeline).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row["_id"].clone()).collect();
        assert_eq!(ids, vec![json!("b2"), json!("b3")]);

        let beyond = Pipeline::new().skip(10).limit(5);
        assert!(store.aggregate("books", &beyond).await.unwrap().is_empty());
    }
}
