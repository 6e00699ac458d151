use super::{key_segments, ContentStore, StoreError};
use crate::core::location::LocationReference;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-process store used by the local simulator and tests.
#[derive(Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<LocationReference, Vec<u8>>>,
    denied: RwLock<HashSet<LocationReference>>,
    reads: AtomicUsize,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads of `location` fail with `AccessDenied`.
    pub fn deny_reads(&self, location: LocationReference) {
        if let Ok(mut denied) = self.denied.write() {
            denied.insert(location);
        }
    }

    /// Number of `get` calls served so far, successful or not.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, location: &LocationReference) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(location))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<LocationReference, StoreError> {
        key_segments(key)?;
        let location = LocationReference::new(container, key)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".to_string()))?;
        objects.insert(location.clone(), bytes);
        Ok(location)
    }

    async fn get(&self, location: &LocationReference) -> Result<Vec<u8>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let denied = self
            .denied
            .read()
            .map(|denied| denied.contains(location))
            .unwrap_or(false);
        if denied {
            return Err(StoreError::AccessDenied {
                location: location.clone(),
                detail: "read permission withheld".to_string(),
            });
        }
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".to_string()))?;
        objects
            .get(location)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(location.clone()))
    }
}
