//! Transformation hook: the request/response contract invoked by the deployment
//! engine while it computes a change.
//!
//! Every request gets a response. Failures become `status: failure` with a message
//! prefixed by the error kind, and the request id is echoed verbatim.

pub mod server;

use crate::core::location::LocationReference;
use crate::core::store::ContentStore;
use crate::core::template::{DocumentMutator, MutationError, TemplateDocument};
use crate::core::types::{DEFAULT_LOCATION_PARAMETER, DEFAULT_TARGET_PARAMETER};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::Instrument;

/// Request delivered by the deployment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRequest {
    pub request_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub transform_id: String,
    pub fragment: Box<RawValue>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub template_parameter_values: Map<String, Value>,
}

impl TransformationRequest {
    /// Build a request around an already-serialized fragment.
    pub fn new(
        context: InvocationContext,
        fragment: &Value,
        params: Map<String, Value>,
    ) -> Result<Self, serde_json::Error> {
        let fragment = RawValue::from_string(serde_json::to_string(fragment)?)?;
        Ok(Self {
            request_id: context.request_id,
            region: context.region,
            account_id: context.account_id,
            transform_id: context.transform_id,
            fragment,
            params,
            template_parameter_values: Map::new(),
        })
    }

    pub fn context(&self) -> InvocationContext {
        InvocationContext {
            request_id: self.request_id.clone(),
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            transform_id: self.transform_id.clone(),
        }
    }
}

/// Caller-supplied invocation context, passed explicitly instead of read from globals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub region: String,
    pub account_id: String,
    pub transform_id: String,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResponse {
    pub request_id: String,
    pub status: TransformationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransformationResponse {
    pub fn success(request_id: impl Into<String>, fragment: Value) -> Self {
        Self {
            request_id: request_id.into(),
            status: TransformationStatus::Success,
            fragment: Some(fragment),
            error_message: None,
        }
    }

    pub fn failure(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: TransformationStatus::Failure,
            fragment: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransformationStatus::Success
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("required parameter '{name}' was not supplied")]
    MissingParameter { name: String },
    #[error("parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

impl HookError {
    pub fn kind(&self) -> String {
        match self {
            HookError::MissingParameter { .. } => "MissingParameter".to_string(),
            HookError::InvalidParameter { .. } => "InvalidParameter".to_string(),
            HookError::Mutation(err) => err.kind().to_string(),
        }
    }
}

/// Names of the two template parameters the hook resolves on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookParameters {
    pub location: String,
    pub target: String,
}

impl Default for HookParameters {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION_PARAMETER.to_string(),
            target: DEFAULT_TARGET_PARAMETER.to_string(),
        }
    }
}

pub struct TransformationHook {
    store: Arc<dyn ContentStore>,
    mutator: DocumentMutator,
    parameters: HookParameters,
}

impl TransformationHook {
    pub fn new(store: Arc<dyn ContentStore>, mutator: DocumentMutator, parameters: HookParameters) -> Self {
        Self {
            store,
            mutator,
            parameters,
        }
    }

    /// Handle one request. Never fails; errors are folded into the response.
    pub async fn handle(&self, request: TransformationRequest) -> TransformationResponse {
        let context = request.context();
        let span = tracing::info_span!(
            "transform",
            request_id = %context.request_id,
            region = %context.region,
            account_id = %context.account_id,
        );
        match self.transform(&context, &request).instrument(span).await {
            Ok(fragment) => {
                tracing::info!(request_id = %context.request_id, "transformation succeeded");
                TransformationResponse::success(context.request_id, fragment)
            }
            Err(err) => {
                tracing::warn!(request_id = %context.request_id, kind = %err.kind(), "transformation failed: {}", err);
                TransformationResponse::failure(
                    context.request_id,
                    format!("[{}] {}", err.kind(), err),
                )
            }
        }
    }

    /// Resolve parameters, then fetch and splice the workflow.
    pub async fn transform(
        &self,
        context: &InvocationContext,
        request: &TransformationRequest,
    ) -> Result<Value, HookError> {
        let location_text = self.resolve_parameter(request, &self.parameters.location)?;
        let location = location_text
            .parse::<LocationReference>()
            .map_err(|err| HookError::InvalidParameter {
                name: self.parameters.location.clone(),
                reason: err.to_string(),
            })?;
        let target = self.resolve_parameter(request, &self.parameters.target)?;
        tracing::debug!(
            request_id = %context.request_id,
            transform_id = %context.transform_id,
            location = %location,
            target_resource = %target,
            "resolved transformation parameters"
        );
        let document = TemplateDocument::from_slice(request.fragment.get().as_bytes())?;
        let mutated = self
            .mutator
            .inject(&document, &location, &target, self.store.as_ref())
            .await?;
        Ok(mutated)
    }

    fn resolve_parameter(
        &self,
        request: &TransformationRequest,
        name: &str,
    ) -> Result<String, HookError> {
        let value = request
            .params
            .get(name)
            .or_else(|| request.template_parameter_values.get(name))
            .ok_or_else(|| HookError::MissingParameter {
                name: name.to_string(),
            })?;
        match value {
            Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Value::String(_) => Err(HookError::InvalidParameter {
                name: name.to_string(),
                reason: "value is empty".to_string(),
            }),
            other => Err(HookError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
        }
    }
}
