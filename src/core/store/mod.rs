//! Blob storage for workflow documents.
//!
//! The hook reads through [`ContentStore::get`] on every invocation; nothing is
//! cached, since the application team may re-upload between deployments.

use crate::core::location::{LocationError, LocationReference};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod fs;
mod http;
mod memory;

pub use fs::FsContentStore;
pub use http::HttpContentStore;
pub use memory::MemoryContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` at `container/key`, replacing any existing blob.
    async fn put(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<LocationReference, StoreError>;

    /// Read the blob behind `location`.
    async fn get(&self, location: &LocationReference) -> Result<Vec<u8>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no object at {0}")]
    NotFound(LocationReference),
    #[error("access denied to {location}: {detail}")]
    AccessDenied {
        location: LocationReference,
        detail: String,
    },
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("content store returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("content store unreachable: {0}")]
    Transport(String),
    #[error("content store I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, StoreError::AccessDenied { .. })
    }
}

/// Storage tier requested on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    #[default]
    Standard,
    StandardIa,
    OnezoneIa,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "STANDARD" => Ok(StorageClass::Standard),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "ONEZONE_IA" => Ok(StorageClass::OnezoneIa),
            _ => Err(format!(
                "invalid storage class '{}'; supported values are STANDARD, STANDARD_IA, ONEZONE_IA",
                value
            )),
        }
    }
}

/// Split a key into path segments, rejecting anything that could escape the container.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(invalid("key must be a relative path"));
    }
    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        match *segment {
            "" => return Err(invalid("key contains an empty segment")),
            "." | ".." => return Err(invalid("key must not contain relative segments")),
            _ => {}
        }
    }
    Ok(segments)
}
