//! MongoDB backend. Filters and pipeline stages translate 1:1 into native
//! queries; documents travel as BSON and are converted at the edge.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document as BsonDocument};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Database, IndexModel};
use serde_json::Value;

use crate::filter::{FindQuery, SortOrder};
use crate::pipeline::{Pipeline, Projection, Stage};
use crate::{Document, DocumentStore, Filter, IndexSpec, StoreError};

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            database: client.database(name),
        })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<BsonDocument> {
        self.database.collection(name)
    }
}

fn classify(collection: &str, err: mongodb::error::Error) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            Some(write.message.clone())
        }
        ErrorKind::Command(command) if command.code == DUPLICATE_KEY => {
            Some(command.message.clone())
        }
        _ => None,
    };
    match duplicate {
        Some(index) => StoreError::Duplicate {
            collection: collection.to_string(),
            index,
        },
        None => StoreError::Mongo(err),
    }
}

fn to_bson(value: &Value) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|err| StoreError::Backend(err.to_string()))
}

fn to_bson_document(document: &Document) -> Result<BsonDocument, StoreError> {
    bson::to_document(document).map_err(|err| StoreError::Backend(err.to_string()))
}

fn from_bson_document(document: BsonDocument) -> Result<Document, StoreError> {
    match serde_json::to_value(&document)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotADocument),
    }
}

/// Escape regex metacharacters so a search term matches literally.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if r"\.^$|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn translate_filter(filter: &Filter) -> Result<BsonDocument, StoreError> {
    let mut translated = BsonDocument::new();
    match filter {
        Filter::All => {}
        Filter::Eq { field, value } => {
            translated.insert(field.clone(), to_bson(value)?);
        }
        Filter::In { field, values } => {
            let values = values.iter().map(to_bson).collect::<Result<Vec<_>, _>>()?;
            translated.insert(field.clone(), doc! { "$in": values });
        }
        Filter::ContainsIgnoreCase { field, needle } => {
            translated.insert(
                field.clone(),
                doc! { "$regex": escape_regex(needle), "$options": "i" },
            );
        }
        Filter::Missing { field } => {
            translated.insert(field.clone(), doc! { "$exists": false });
        }
        Filter::Or(filters) if filters.is_empty() => {
            translated.insert("_id", doc! { "$in": Vec::<Bson>::new() });
        }
        Filter::Or(filters) => {
            let branches = filters
                .iter()
                .map(translate_filter)
                .collect::<Result<Vec<_>, _>>()?;
            translated.insert("$or", branches);
        }
        Filter::And(filters) => {
            let branches = filters
                .iter()
                .map(translate_filter)
                .collect::<Result<Vec<_>, _>>()?;
            translated.insert("$and", branches);
        }
    }
    Ok(translated)
}

fn translate_sort(keys: &[(String, SortOrder)]) -> BsonDocument {
    let mut sort = BsonDocument::new();
    for (field, order) in keys {
        let direction = match order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        };
        sort.insert(field.clone(), direction);
    }
    sort
}

fn translate_pipeline(pipeline: &Pipeline) -> Result<Vec<BsonDocument>, StoreError> {
    pipeline
        .stages()
        .iter()
        .map(|stage| {
            Ok(match stage {
                Stage::Match(filter) => doc! { "$match": translate_filter(filter)? },
                Stage::Sort(keys) => doc! { "$sort": translate_sort(keys) },
                Stage::Skip(count) => doc! { "$skip": *count as i64 },
                Stage::Limit(count) => doc! { "$limit": *count as i64 },
                Stage::Lookup {
                    from,
                    local_field,
                    foreign_field,
                    as_field,
                } => doc! {
                    "$lookup": {
                        "from": from.as_str(),
                        "localField": local_field.as_str(),
                        "foreignField": foreign_field.as_str(),
                        "as": as_field.as_str(),
                    }
                },
                Stage::Average {
                    input,
                    field,
                    output,
                } => {
                    let mut fields = BsonDocument::new();
                    fields.insert(output.clone(), doc! { "$avg": format!("${input}.{field}") });
                    doc! { "$addFields": fields }
                }
                Stage::Project(projections) => {
                    let mut fields = BsonDocument::new();
                    for projection in projections {
                        match projection {
                            Projection::Field(field) => {
                                fields.insert(field.clone(), 1);
                            }
                            Projection::OrElse { field, fallback } => {
                                fields.insert(
                                    field.clone(),
                                    doc! { "$ifNull": [format!("${field}"), to_bson(fallback)?] },
                                );
                            }
                        }
                    }
                    doc! { "$project": fields }
                }
            })
        })
        .collect()
}

async fn collect(
    collection: &str,
    cursor: mongodb::Cursor<BsonDocument>,
) -> Result<Vec<Document>, StoreError> {
    let documents: Vec<BsonDocument> = cursor
        .try_collect()
        .await
        .map_err(|err| classify(collection, err))?;
    documents.into_iter().map(from_bson_document).collect()
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongo"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn ensure_index(&self, index: &IndexSpec) -> Result<(), StoreError> {
        let mut keys = BsonDocument::new();
        keys.insert(index.field, 1);
        let model = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(index.name.to_string())
                    .unique(index.unique)
                    .build(),
            )
            .build();
        self.collection(index.collection)
            .create_index(model)
            .await
            .map_err(|err| classify(index.collection, err))?;
        Ok(())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<Document, StoreError> {
        if !document.get(crate::ID_FIELD).is_some_and(Value::is_string) {
            return Err(StoreError::MissingId);
        }
        self.collection(collection)
            .insert_one(to_bson_document(&document)?)
            .await
            .map_err(|err| classify(collection, err))?;
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
        self.collection(collection)
            .find_one(translate_filter(filter)?)
            .await
            .map_err(|err| classify(collection, err))?
            .map(from_bson_document)
            .transpose()
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let mut find = self
            .collection(collection)
            .find(translate_filter(&query.filter)?)
            .skip(query.skip);
        if let Some(limit) = query.limit {
            find = find.limit(limit as i64);
        }
        if !query.sort.is_empty() {
            find = find.sort(translate_sort(&query.sort));
        }
        let cursor = find.await.map_err(|err| classify(collection, err))?;
        collect(collection, cursor).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.collection(collection)
            .count_documents(translate_filter(filter)?)
            .await
            .map_err(|err| classify(collection, err))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut changes: Document,
    ) -> Result<Option<Document>, StoreError> {
        changes.remove(crate::ID_FIELD);
        self.collection(collection)
            .find_one_and_update(
                translate_filter(filter)?,
                doc! { "$set": to_bson_document(&changes)? },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| classify(collection, err))?
            .map(from_bson_document)
            .transpose()
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.collection(collection)
            .find_one_and_delete(translate_filter(&Filter::id(id))?)
            .await
            .map_err(|err| classify(collection, err))?
            .map(from_bson_document)
            .transpose()
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .delete_many(translate_filter(filter)?)
            .await
            .map_err(|err| classify(collection, err))?;
        Ok(result.deleted_count)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(collection)
            .aggregate(translate_pipeline(pipeline)?)
            .await
            .map_err(|err| classify(collection, err))?;
        collect(collection, cursor).await
    }
}
