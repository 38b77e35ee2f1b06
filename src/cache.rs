// 🗂️ Workbook Cache
// Parsed workbooks keyed by the SHA-256 of their bytes

use crate::error::FormatError;
use crate::loader::{SpreadsheetLoader, Workbook};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Lowercase hex SHA-256 of the file content
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Owned by whoever presents results and handed to each load.
///
/// Entries are shared read-only through `Arc`; nothing downstream of a load
/// mutates them. There is no eviction.
#[derive(Debug, Default)]
pub struct WorkbookCache {
    entries: HashMap<String, Arc<Workbook>>,
}

impl WorkbookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached workbook for these bytes, loading it on a miss.
    /// A failed load leaves the cache untouched.
    pub fn get_or_load(
        &mut self,
        bytes: &[u8],
        loader: &dyn SpreadsheetLoader,
    ) -> Result<(String, Arc<Workbook>), FormatError> {
        let hash = content_hash(bytes);

        if let Some(workbook) = self.entries.get(&hash) {
            debug!(hash = %hash, "workbook cache hit");
            return Ok((hash, Arc::clone(workbook)));
        }

        debug!(hash = %hash, format = loader.format(), "workbook cache miss");
        let workbook = self.insert(hash.clone(), loader.load(bytes)?);
        Ok((hash, workbook))
    }

    pub fn get(&self, hash: &str) -> Option<Arc<Workbook>> {
        self.entries.get(hash).cloned()
    }

    /// Store a workbook parsed outside the cache. If the hash is already
    /// present the existing entry wins and is returned.
    pub fn insert(&mut self, hash: String, workbook: Workbook) -> Arc<Workbook> {
        Arc::clone(self.entries.entry(hash).or_insert_with(|| Arc::new(workbook)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
