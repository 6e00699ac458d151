use super::{MutationError, TemplateDocument, WorkflowDefinition};
use crate::core::location::LocationReference;
use crate::core::store::ContentStore;
use crate::core::types::{DEFINITION_FIELD, STATE_MACHINE_RESOURCE_TYPE};
use serde_json::Value;

/// Replaces the definition field of one state-machine resource with fetched content.
#[derive(Debug, Clone)]
pub struct DocumentMutator {
    resource_type: String,
    definition_field: String,
}

impl Default for DocumentMutator {
    fn default() -> Self {
        Self::new(STATE_MACHINE_RESOURCE_TYPE, DEFINITION_FIELD)
    }
}

impl DocumentMutator {
    pub fn new(resource_type: impl Into<String>, definition_field: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            definition_field: definition_field.into(),
        }
    }

    /// Fetch the workflow at `location` and splice it into a copy of `document`.
    ///
    /// The target is checked before any fetch, so a misnamed resource never costs a
    /// store round trip. `document` itself is never modified.
    pub async fn inject(
        &self,
        document: &TemplateDocument,
        location: &LocationReference,
        target: &str,
        store: &dyn ContentStore,
    ) -> Result<Value, MutationError> {
        self.locate(document, target)?;
        let bytes = store
            .get(location)
            .await
            .map_err(|source| MutationError::ContentFetchError {
                location: location.clone(),
                source,
            })?;
        let workflow = WorkflowDefinition::parse(&bytes)?;
        tracing::debug!(
            target_resource = target,
            location = %location,
            start_at = workflow.start_at(),
            "fetched workflow definition"
        );
        self.splice(document, target, &workflow)
    }

    /// Check that exactly one resource named `target` exists and has the expected type.
    pub fn locate<'a>(
        &self,
        document: &'a TemplateDocument,
        target: &str,
    ) -> Result<&'a Value, MutationError> {
        let matches: Vec<&Value> = document
            .resources()
            .iter()
            .filter(|(name, _)| name == target)
            .map(|(_, body)| body)
            .collect();

        let resource = match matches.as_slice() {
            [] => {
                return Err(MutationError::ResourceNotFound {
                    name: target.to_string(),
                })
            }
            [single] => *single,
            many => {
                return Err(MutationError::AmbiguousResource {
                    name: target.to_string(),
                    count: many.len(),
                })
            }
        };

        let actual = resource.get("Type").and_then(Value::as_str).unwrap_or("");
        if actual != self.resource_type {
            return Err(MutationError::WrongResourceType {
                name: target.to_string(),
                expected: self.resource_type.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(resource)
    }

    /// Write `workflow` into the target's definition field on a copy of `document`.
    pub fn splice(
        &self,
        document: &TemplateDocument,
        target: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<Value, MutationError> {
        self.locate(document, target)?;
        let mut root = document.as_value().clone();
        let resource = TemplateDocument::resources_mut(&mut root)
            .and_then(|resources| resources.get_mut(target))
            .ok_or_else(|| MutationError::ResourceNotFound {
                name: target.to_string(),
            })?;
        let properties = resource
            .as_object_mut()
            .and_then(|body| body.get_mut("Properties"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                MutationError::MalformedDocument(format!(
                    "resource '{}' has no Properties mapping",
                    target
                ))
            })?;
        if let Some(existing) = properties.get(&self.definition_field) {
            if !existing.is_string() {
                return Err(MutationError::MalformedDocument(format!(
                    "resource '{}' property {} must be textual",
                    target, self.definition_field
                )));
            }
        }
        properties.insert(
            self.definition_field.clone(),
            Value::String(workflow.to_definition_string()),
        );
        Ok(root)
    }
}
