mod memory;

pub use memory::MemoryStore;

use crate::error::{Error, StoreError};
use chrono::DateTime;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use uuid::Uuid;

/// A schemaless JSON record
pub type Document = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

///
/// Equality filters over top-level fields, an optional sort and an optional limit
///
#[derive(Clone, Debug)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: &str) -> Self {
        Query {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }

    ///
    /// Filter, sort and truncate the candidate documents
    ///
    pub fn apply<'a>(&self, documents: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched = documents
            .filter(|document| self.matches(document))
            .cloned()
            .collect::<Vec<_>>();

        if let Some((field, direction)) = &self.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched
    }
}

///
/// Orders missing < null < bool < number < string; arrays and objects compare equal.
/// Strings that both parse as RFC 3339 timestamps compare as instants.
///
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Clone, Debug)]
pub enum Write {
    /// Create a new document, failing if the id is taken
    Insert {
        collection: String,
        id: String,
        document: Document,
    },
    /// Replace the document, or merge top-level fields into it
    Set {
        collection: String,
        id: String,
        document: Document,
        merge: bool,
    },
    /// Overwrite top-level fields of an existing document
    Update {
        collection: String,
        id: String,
        fields: Document,
    },
    Delete {
        collection: String,
        id: String,
    },
    /// Add one to an integer counter field, optionally copying the new value
    /// onto a document written earlier in the same batch
    Increment {
        collection: String,
        id: String,
        field: String,
        copy_to: Option<FieldRef>,
    },
}

/// A field of one document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub collection: String,
    pub id: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(collection: &str, id: &str, field: &str) -> Self {
        FieldRef {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
        }
    }
}

///
/// Writes that are committed together or not at all
///
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an insert under a generated id and returns that id
    pub fn insert(&mut self, collection: &str, document: Document) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert_with_id(collection, &id, document);
        id
    }

    pub fn insert_with_id(&mut self, collection: &str, id: &str, document: Document) -> &mut Self {
        self.writes.push(Write::Insert {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        });
        self
    }

    pub fn set(&mut self, collection: &str, id: &str, document: Document, merge: bool) -> &mut Self {
        self.writes.push(Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
            merge,
        });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: Document) -> &mut Self {
        self.writes.push(Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    ///
    /// Queues a counter increment. Missing documents and fields start from zero.
    /// With `copy_to`, the new value is also written to that field, which must
    /// belong to a document that exists once the earlier writes are applied.
    ///
    pub fn increment(&mut self, collection: &str, id: &str, field: &str, copy_to: Option<FieldRef>) -> &mut Self {
        self.writes.push(Write::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            copy_to,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

///
/// Persistence for loosely-typed JSON documents grouped in collections.
///
/// Single operations and batches are atomic. Nothing spans calls.
///
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, Error>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, Error>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), Error>;
}

///
/// Typed helpers over any `DocumentStore`
///
#[async_trait::async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_as<T: DeserializeOwned + Send>(&self, collection: &str, id: &str) -> Result<Option<T>, Error> {
        match self.get(collection, id).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    async fn query_as<T: DeserializeOwned + Send>(&self, query: &Query) -> Result<Vec<T>, Error> {
        self.query(query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    async fn insert<T: Serialize + Sync>(&self, collection: &str, value: &T) -> Result<String, Error> {
        let mut batch = WriteBatch::new();
        let id = batch.insert(collection, to_document(value)?);
        self.commit(batch).await?;
        Ok(id)
    }

    async fn set<T: Serialize + Sync>(&self, collection: &str, id: &str, value: &T, merge: bool) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, to_document(value)?, merge);
        self.commit(batch).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, Error> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        _ => Err(StoreError::NotAnObject {
            collection: String::new(),
            id: String::new(),
        }
        .into()),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, Error> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

///
/// Builds a `Document` from `field => value` pairs
///
#[macro_export]
macro_rules! fields {
    ($($field:expr => $value:expr),* $(,)?) => {{
        let mut document = $crate::store::Document::new();
        $(
            document.insert($field.to_string(), serde_json::json!($value));
        )*
        document
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn query_filters_sorts_and_limits() {
        let documents = vec![
            document(json!({"doctorId": "d1", "date": "2026-01-10"})),
            document(json!({"doctorId": "d2", "date": "2026-01-12"})),
            document(json!({"doctorId": "d1", "date": "2026-01-14"})),
            document(json!({"doctorId": "d1", "date": "2026-01-11"})),
        ];

        let query = Query::collection("appointments")
            .filter("doctorId", "d1")
            .order_by("date", Direction::Descending)
            .limit(2);

        let dates = query
            .apply(documents.iter())
            .into_iter()
            .map(|d| d["date"].clone())
            .collect::<Vec<_>>();

        assert_eq!(dates, vec![json!("2026-01-14"), json!("2026-01-11")]);
    }

    #[test]
    fn numbers_compare_numerically() {
        let a = json!(9);
        let b = json!(10.5);
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_values(None, Some(&a)), Ordering::Less);
    }

    #[test]
    fn timestamps_compare_by_instant() {
        let cases = [
            ("2026-01-10T10:00:00.500Z", "2026-01-10T10:00:00.500000001Z"),
            ("2026-01-10T10:00:00Z", "2026-01-10T10:00:00.000000001Z"),
            ("2026-01-10T10:00:00.9Z", "2026-01-10T10:00:01Z"),
        ];
        for (earlier, later) in cases {
            assert_eq!(
                compare_values(Some(&json!(earlier)), Some(&json!(later))),
                Ordering::Less,
                "{earlier} < {later}"
            );
        }

        // Plain dates and other strings still compare as text
        assert_eq!(
            compare_values(Some(&json!("2026-01-09")), Some(&json!("2026-01-10"))),
            Ordering::Less
        );
    }

    #[test]
    fn newest_first_survives_mixed_fraction_widths() {
        let documents = vec![
            document(json!({"id": "first", "createdAt": "2026-01-10T10:00:00Z"})),
            document(json!({"id": "second", "createdAt": "2026-01-10T10:00:00.250Z"})),
            document(json!({"id": "third", "createdAt": "2026-01-10T10:00:00.250000100Z"})),
        ];

        let ids = Query::collection("reviews")
            .order_by("createdAt", Direction::Descending)
            .apply(documents.iter())
            .into_iter()
            .map(|d| d["id"].clone())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec![json!("third"), json!("second"), json!("first")]);
    }

    #[test]
    fn fields_macro_builds_documents() {
        let doc = fields! { "status" => "cancelled", "hasPrescription" => true };
        assert_eq!(doc.get("status"), Some(&json!("cancelled")));
        assert_eq!(doc.get("hasPrescription"), Some(&json!(true)));
    }
}
