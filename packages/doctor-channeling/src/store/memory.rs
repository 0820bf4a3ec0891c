use super::{Document, DocumentStore, Query, Write, WriteBatch};
use crate::config::StoreConfig;
use crate::error::{Error, StoreError};
use crate::log::STORE;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

type Collection = BTreeMap<String, Document>;
type Collections = HashMap<String, Collection>;

///
/// In-process document store.
///
/// All writes take a single lock, so a `WriteBatch` is applied atomically
/// and its counter increments are true read-modify-writes.
/// With a snapshot path configured, every committed write is flushed to disk
/// before the lock is released.
///
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(config: &StoreConfig) -> Result<Self, Error> {
        let Some(path) = &config.path else {
            info!(target: STORE, msg = "Document store is not persistent");
            return Ok(MemoryStore::new());
        };

        let collections = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<Collections>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(err) => return Err(StoreError::Io(err).into()),
        };

        info!(
            target: STORE,
            msg = "Loaded document store snapshot",
            path = %path.display(),
            collections = collections.len()
        );

        Ok(MemoryStore {
            collections: RwLock::new(collections),
            snapshot: Some(path.to_owned()),
        })
    }

    async fn flush(&self, collections: &Collections) -> Result<(), Error> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        write_snapshot(path, collections).await
    }
}

async fn write_snapshot(path: &Path, collections: &Collections) -> Result<(), Error> {
    let bytes = serde_json::to_vec(collections)?;

    // Write next to the target and rename, so a crash never leaves a torn snapshot
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    tokio::fs::write(&temp, bytes).await.map_err(StoreError::Io)?;
    tokio::fs::rename(&temp, path).await.map_err(StoreError::Io)?;

    debug!(target: STORE, msg = "Flushed snapshot", path = %path.display());
    Ok(())
}

type Key = (String, String);

///
/// Pending document states for one batch.
/// `None` marks a deletion.
///
struct Staged<'a> {
    base: &'a Collections,
    changes: HashMap<Key, Option<Document>>,
    order: Vec<Key>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a Collections) -> Self {
        Staged {
            base,
            changes: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn current(&self, collection: &str, id: &str) -> Option<&Document> {
        let key = (collection.to_string(), id.to_string());
        match self.changes.get(&key) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(collection).and_then(|c| c.get(id)),
        }
    }

    fn put(&mut self, collection: &str, id: &str, document: Option<Document>) {
        let key = (collection.to_string(), id.to_string());
        if !self.changes.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.changes.insert(key, document);
    }

    fn stage(&mut self, write: Write) -> Result<(), StoreError> {
        match write {
            Write::Insert {
                collection,
                id,
                mut document,
            } => {
                if self.current(&collection, &id).is_some() {
                    return Err(StoreError::AlreadyExists { collection, id });
                }
                document.insert("id".to_string(), Value::String(id.clone()));
                self.put(&collection, &id, Some(document));
            }
            Write::Set {
                collection,
                id,
                document,
                merge,
            } => {
                let mut next = match (merge, self.current(&collection, &id)) {
                    (true, Some(existing)) => {
                        let mut merged = existing.clone();
                        merged.extend(document);
                        merged
                    }
                    _ => document,
                };
                next.insert("id".to_string(), Value::String(id.clone()));
                self.put(&collection, &id, Some(next));
            }
            Write::Update {
                collection,
                id,
                fields,
            } => {
                let Some(existing) = self.current(&collection, &id) else {
                    return Err(StoreError::DocumentNotFound { collection, id });
                };
                let mut next = existing.clone();
                next.extend(fields);
                self.put(&collection, &id, Some(next));
            }
            Write::Delete { collection, id } => {
                self.put(&collection, &id, None);
            }
            Write::Increment {
                collection,
                id,
                field,
                copy_to,
            } => {
                let current = self.current(&collection, &id);
                let value = match current.and_then(|d| d.get(&field)) {
                    None => 0,
                    Some(v) => v.as_i64().ok_or_else(|| StoreError::InvalidCounter {
                        collection: collection.clone(),
                        id: id.clone(),
                    })?,
                };
                let next = value + 1;

                let mut counter = current.cloned().unwrap_or_default();
                counter.insert("id".to_string(), Value::String(id.clone()));
                counter.insert(field, Value::from(next));
                self.put(&collection, &id, Some(counter));

                if let Some(target) = copy_to {
                    let Some(existing) = self.current(&target.collection, &target.id) else {
                        return Err(StoreError::DocumentNotFound {
                            collection: target.collection,
                            id: target.id,
                        });
                    };
                    let mut document = existing.clone();
                    document.insert(target.field, Value::from(next));
                    self.put(&target.collection, &target.id, Some(document));
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Changes {
        Changes {
            changes: self.changes,
            order: self.order,
        }
    }
}

struct Changes {
    changes: HashMap<Key, Option<Document>>,
    order: Vec<Key>,
}

impl Changes {
    fn apply(mut self, collections: &mut Collections) {
        for key in self.order {
            let Some(change) = self.changes.remove(&key) else {
                continue;
            };
            let (collection, id) = key;
            match change {
                Some(document) => {
                    collections.entry(collection).or_default().insert(id, document);
                }
                None => {
                    if let Some(c) = collections.get_mut(&collection) {
                        c.remove(&id);
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, Error> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, Error> {
        let collections = self.collections.read().await;
        let documents = match collections.get(&query.collection) {
            Some(collection) => query.apply(collection.values()),
            None => Vec::new(),
        };
        debug!(
            target: STORE,
            msg = "Query",
            collection = query.collection,
            filters = query.filters.len(),
            results = documents.len()
        );
        Ok(documents)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let writes = batch.len();
        let mut collections = self.collections.write().await;

        let mut staged = Staged::new(&collections);
        for write in batch.into_writes() {
            staged.stage(write)?;
        }
        let changes = staged.finish();

        // Snapshot the post-commit state before touching the live map,
        // so a failed flush leaves memory and disk in agreement
        if self.snapshot.is_some() {
            let mut next = collections.clone();
            changes.apply(&mut next);
            self.flush(&next).await?;
            *collections = next;
        } else {
            changes.apply(&mut collections);
        }

        debug!(target: STORE, msg = "Committed batch", writes);
        Ok(())
    }
}
