use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Scheme used for the textual form of a location reference.
pub const LOCATION_SCHEME: &str = "s3";

/// Where a workflow document lives in the content store.
///
/// Keys are caller chosen. Redeploying the same logical version must reuse the
/// same key; nothing here derives keys from content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationReference {
    container: String,
    key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location container must not be empty")]
    EmptyContainer,
    #[error("location key must not be empty")]
    EmptyKey,
    #[error("location '{0}' must have the form s3://container/key")]
    Malformed(String),
}

impl LocationReference {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Result<Self, LocationError> {
        let container = container.into();
        let key = key.into();
        if container.trim().is_empty() {
            return Err(LocationError::EmptyContainer);
        }
        let key = key.trim_start_matches('/').to_string();
        if key.trim().is_empty() {
            return Err(LocationError::EmptyKey);
        }
        Ok(Self { container, key })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for LocationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", LOCATION_SCHEME, self.container, self.key)
    }
}

impl FromStr for LocationReference {
    type Err = LocationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let rest = trimmed
            .strip_prefix(LOCATION_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| LocationError::Malformed(trimmed.to_string()))?;
        let (container, key) = rest
            .split_once('/')
            .ok_or_else(|| LocationError::Malformed(trimmed.to_string()))?;
        LocationReference::new(container, key)
    }
}

impl Serialize for LocationReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocationReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
