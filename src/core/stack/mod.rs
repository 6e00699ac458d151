//! Client side of the stack-management service that computes and applies changes.

mod http;
mod local;

pub use http::HttpStackService;
pub use local::{LocalStackService, LocalStackSnapshot};

use crate::core::location::LocationReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[async_trait]
pub trait StackService: Send + Sync {
    /// Ask the service to compute a change for `proposal.stack_name`.
    async fn submit_change(&self, proposal: &ChangeProposal) -> Result<ChangeId, StackError>;

    async fn get_change_status(&self, change_id: &ChangeId) -> Result<ChangeStatus, StackError>;

    /// Apply a change that reached `ready`.
    async fn execute_change(&self, change_id: &ChangeId) -> Result<(), StackError>;

    async fn get_stack_status(&self, stack_name: &str) -> Result<StackStatus, StackError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("stack '{0}' does not exist or is not ready for update")]
    StackNotFound(String),
    #[error("change {0} is unknown to the stack service")]
    ChangeNotFound(ChangeId),
    #[error("stack service rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected response from stack service: {0}")]
    Protocol(String),
    #[error("stack service returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("stack service unreachable: {0}")]
    Transport(String),
}

/// Identifier assigned by the service to a submitted change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the service needs to compute one change: the stack, the staged
/// workflow location, and the template parameters that point the hook at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProposal {
    pub stack_name: String,
    pub change_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: LocationReference,
    pub target_resource: String,
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
}

impl ChangeProposal {
    /// Change names must start with a letter; a bare UUID may not.
    pub fn generate_change_name() -> String {
        format!("A{}", uuid::Uuid::new_v4().simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeState {
    Computing,
    Ready,
    Empty,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    Add,
    Modify,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub logical_id: String,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub status: ComputeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ResourceChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackState {
    Executing,
    Applied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStatus {
    pub status: StackState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
