//! Template parsing, workflow validation, and definition injection.

mod document;
mod mutator;
mod parameters;
mod workflow;

pub use document::TemplateDocument;
pub use mutator::DocumentMutator;
pub use parameters::{check_template_parameters, TemplateParameterError};
pub use workflow::{validate_workflow, WorkflowDefinition, WorkflowError};

use crate::core::location::LocationReference;
use crate::core::store::StoreError;
use serde::Serialize;
use std::fmt;

/// Tag carried alongside a mutation failure so callers can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationErrorKind {
    MalformedDocument,
    ResourceNotFound,
    AmbiguousResource,
    WrongResourceType,
    ContentFetchError,
    InvalidWorkflowContent,
}

impl fmt::Display for MutationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("resource '{name}' not found in Resources")]
    ResourceNotFound { name: String },
    #[error("resource name '{name}' matches {count} entries in Resources")]
    AmbiguousResource { name: String, count: usize },
    #[error("resource '{name}' has type '{actual}', expected '{expected}'")]
    WrongResourceType {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("failed to fetch workflow from {location}: {source}")]
    ContentFetchError {
        location: LocationReference,
        #[source]
        source: StoreError,
    },
    #[error("invalid workflow content: {0}")]
    InvalidWorkflowContent(#[from] WorkflowError),
}

impl MutationError {
    pub fn kind(&self) -> MutationErrorKind {
        match self {
            MutationError::MalformedDocument(_) => MutationErrorKind::MalformedDocument,
            MutationError::ResourceNotFound { .. } => MutationErrorKind::ResourceNotFound,
            MutationError::AmbiguousResource { .. } => MutationErrorKind::AmbiguousResource,
            MutationError::WrongResourceType { .. } => MutationErrorKind::WrongResourceType,
            MutationError::ContentFetchError { .. } => MutationErrorKind::ContentFetchError,
            MutationError::InvalidWorkflowContent(_) => MutationErrorKind::InvalidWorkflowContent,
        }
    }
}
