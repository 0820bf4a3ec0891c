use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file for the document store.
    /// Documents live in memory only when unset.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }
}
