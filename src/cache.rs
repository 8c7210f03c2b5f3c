use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::result::AnalysisResult;

/// Completed snapshots keyed by input fingerprint.
///
/// Readers never block each other. Writes replace whatever was stored under
/// the same fingerprint, which is harmless because identical inputs produce
/// identical snapshots.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<String, Arc<AnalysisResult>>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<AnalysisResult>> {
        self.entries.read().get(fingerprint).cloned()
    }

    pub fn insert(&self, result: AnalysisResult) -> Arc<AnalysisResult> {
        let result = Arc::new(result);
        self.entries
            .write()
            .insert(result.fingerprint().to_string(), Arc::clone(&result));
        result
    }

    pub fn remove(&self, fingerprint: &str) -> Option<Arc<AnalysisResult>> {
        self.entries.write().remove(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Fingerprints currently stored, sorted.
    pub fn fingerprints(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
