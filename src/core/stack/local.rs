use super::{
    ChangeAction, ChangeId, ChangeProposal, ChangeStatus, ComputeState, ResourceChange, StackError,
    StackService, StackState, StackStatus,
};
use crate::core::hook::{InvocationContext, TransformationHook, TransformationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persistable view of the simulator: source and deployed template per stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalStackSnapshot {
    pub stacks: BTreeMap<String, StackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub template: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed: Option<Value>,
}

struct StackRecord {
    template: Value,
    deployed: Option<Value>,
    state: StackState,
    reason: Option<String>,
    in_flight: Option<ChangeId>,
    apply: Option<PendingApply>,
    fail_next_apply: Option<String>,
}

struct PendingApply {
    template: Value,
    remaining_polls: u32,
    failure: Option<String>,
}

struct ChangeRecord {
    stack_name: String,
    status: ChangeStatus,
    transformed: Option<Value>,
    remaining_polls: u32,
    executed: bool,
}

#[derive(Default)]
struct LocalState {
    stacks: BTreeMap<String, StackRecord>,
    changes: BTreeMap<ChangeId, ChangeRecord>,
    sequence: u64,
}

/// In-process stack service that runs the transformation hook itself.
///
/// Change computation and application each report `computing`/`executing` for a
/// configurable number of polls before settling, so callers see the same state
/// progression a remote service would produce.
pub struct LocalStackService {
    hook: Arc<TransformationHook>,
    region: String,
    account_id: String,
    compute_polls: u32,
    apply_polls: u32,
    state: Mutex<LocalState>,
}

impl LocalStackService {
    pub fn new(hook: Arc<TransformationHook>) -> Self {
        Self {
            hook,
            region: "local".to_string(),
            account_id: "000000000000".to_string(),
            compute_polls: 0,
            apply_polls: 0,
            state: Mutex::new(LocalState::default()),
        }
    }

    pub fn with_poll_delays(mut self, compute_polls: u32, apply_polls: u32) -> Self {
        self.compute_polls = compute_polls;
        self.apply_polls = apply_polls;
        self
    }

    pub fn with_context(mut self, region: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.region = region.into();
        self.account_id = account_id.into();
        self
    }

    /// Create or replace the source template of `stack_name`.
    pub async fn register_stack(&self, stack_name: impl Into<String>, template: Value) {
        let mut state = self.state.lock().await;
        let name = stack_name.into();
        match state.stacks.get_mut(&name) {
            Some(record) => record.template = template,
            None => {
                state.stacks.insert(name, StackRecord::new(template, None));
            }
        }
    }

    /// Make the next apply on `stack_name` end in `failed` with `reason`.
    pub async fn fail_next_apply(&self, stack_name: &str, reason: impl Into<String>) -> Result<(), StackError> {
        let mut state = self.state.lock().await;
        let record = state
            .stacks
            .get_mut(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;
        record.fail_next_apply = Some(reason.into());
        Ok(())
    }

    pub async fn deployed_template(&self, stack_name: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.stacks.get(stack_name).and_then(|record| record.deployed.clone())
    }

    pub async fn snapshot(&self) -> LocalStackSnapshot {
        let state = self.state.lock().await;
        let stacks = state
            .stacks
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    StackSnapshot {
                        template: record.template.clone(),
                        deployed: record.deployed.clone(),
                    },
                )
            })
            .collect();
        LocalStackSnapshot { stacks }
    }

    pub async fn restore(&self, snapshot: LocalStackSnapshot) {
        let mut state = self.state.lock().await;
        *state = LocalState::default();
        for (name, stack) in snapshot.stacks {
            state
                .stacks
                .insert(name, StackRecord::new(stack.template, stack.deployed));
        }
    }

    /// Run the hook against `template` and classify the outcome against `deployed`.
    async fn compute(
        &self,
        proposal: &ChangeProposal,
        template: &Value,
        deployed: Option<&Value>,
    ) -> (ChangeStatus, Option<Value>) {
        let request_id = uuid::Uuid::new_v4().to_string();
        let context = InvocationContext {
            request_id: request_id.clone(),
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            transform_id: format!("{}::{}", self.account_id, proposal.change_name),
        };
        let params: Map<String, Value> = proposal
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();
        let request = match TransformationRequest::new(context, template, params) {
            Ok(request) => request,
            Err(err) => return (failed(format!("template could not be encoded: {}", err)), None),
        };

        let response = self.hook.handle(request).await;
        if response.request_id != request_id {
            tracing::error!(
                expected = %request_id,
                received = %response.request_id,
                "transformation response does not echo the request id"
            );
            return (failed("transformation response request id mismatch"), None);
        }
        if !response.is_success() {
            let reason = response
                .error_message
                .unwrap_or_else(|| "transformation failed without a message".to_string());
            return (failed(reason), None);
        }
        let Some(fragment) = response.fragment else {
            return (failed("transformation succeeded without a fragment"), None);
        };

        let changes = diff_resources(deployed, &fragment);
        let status = if changes.is_empty() {
            ChangeStatus {
                status: ComputeState::Empty,
                reason: Some("the submitted template contains no changes".to_string()),
                changes,
            }
        } else {
            ChangeStatus {
                status: ComputeState::Ready,
                reason: None,
                changes,
            }
        };
        (status, Some(fragment))
    }
}

impl StackRecord {
    fn new(template: Value, deployed: Option<Value>) -> Self {
        Self {
            template,
            deployed,
            state: StackState::Applied,
            reason: None,
            in_flight: None,
            apply: None,
            fail_next_apply: None,
        }
    }
}

fn failed(reason: impl Into<String>) -> ChangeStatus {
    ChangeStatus {
        status: ComputeState::Failed,
        reason: Some(reason.into()),
        changes: Vec::new(),
    }
}

fn resources(template: &Value) -> Option<&Map<String, Value>> {
    template.get("Resources").and_then(Value::as_object)
}

/// Resource-level differences between the deployed template and `next`.
fn diff_resources(deployed: Option<&Value>, next: &Value) -> Vec<ResourceChange> {
    let empty = Map::new();
    let before = deployed.and_then(resources).unwrap_or(&empty);
    let after = resources(next).unwrap_or(&empty);
    let resource_type = |body: &Value| body.get("Type").and_then(Value::as_str).map(str::to_string);

    let mut changes = Vec::new();
    for (name, body) in after {
        let action = match before.get(name) {
            None => ChangeAction::Add,
            Some(previous) if previous != body => ChangeAction::Modify,
            Some(_) => continue,
        };
        changes.push(ResourceChange {
            logical_id: name.clone(),
            action,
            resource_type: resource_type(body),
        });
    }
    for (name, body) in before {
        if !after.contains_key(name) {
            changes.push(ResourceChange {
                logical_id: name.clone(),
                action: ChangeAction::Remove,
                resource_type: resource_type(body),
            });
        }
    }
    changes
}

#[async_trait]
impl StackService for LocalStackService {
    async fn submit_change(&self, proposal: &ChangeProposal) -> Result<ChangeId, StackError> {
        // Reserve the stack, then run the hook without holding the lock.
        let (change_id, template, deployed) = {
            let mut state = self.state.lock().await;
            state.sequence += 1;
            let change_id =
                ChangeId::new(format!("local-{}-{}", proposal.change_name, state.sequence));
            let record = state
                .stacks
                .get_mut(&proposal.stack_name)
                .ok_or_else(|| StackError::StackNotFound(proposal.stack_name.clone()))?;
            if let Some(in_flight) = &record.in_flight {
                return Err(StackError::Rejected(format!(
                    "change {} is already in flight for stack {}",
                    in_flight, proposal.stack_name
                )));
            }
            if let Some(template) = &proposal.template {
                record.template = template.clone();
            }
            record.in_flight = Some(change_id.clone());
            (change_id, record.template.clone(), record.deployed.clone())
        };

        let (status, transformed) = self.compute(proposal, &template, deployed.as_ref()).await;
        tracing::debug!(
            change_id = %change_id,
            stack = %proposal.stack_name,
            status = ?status.status,
            "local change computed"
        );

        let mut state = self.state.lock().await;
        state.changes.insert(
            change_id.clone(),
            ChangeRecord {
                stack_name: proposal.stack_name.clone(),
                status,
                transformed,
                remaining_polls: self.compute_polls,
                executed: false,
            },
        );
        Ok(change_id)
    }

    async fn get_change_status(&self, change_id: &ChangeId) -> Result<ChangeStatus, StackError> {
        let mut state = self.state.lock().await;
        let change = state
            .changes
            .get_mut(change_id)
            .ok_or_else(|| StackError::ChangeNotFound(change_id.clone()))?;
        if change.remaining_polls > 0 {
            change.remaining_polls -= 1;
            return Ok(ChangeStatus {
                status: ComputeState::Computing,
                reason: None,
                changes: Vec::new(),
            });
        }
        let status = change.status.clone();
        let stack_name = change.stack_name.clone();
        if matches!(status.status, ComputeState::Empty | ComputeState::Failed) {
            if let Some(record) = state.stacks.get_mut(&stack_name) {
                if record.in_flight.as_ref() == Some(change_id) {
                    record.in_flight = None;
                }
            }
        }
        Ok(status)
    }

    async fn execute_change(&self, change_id: &ChangeId) -> Result<(), StackError> {
        let mut state = self.state.lock().await;
        let change = state
            .changes
            .get_mut(change_id)
            .ok_or_else(|| StackError::ChangeNotFound(change_id.clone()))?;
        if change.remaining_polls > 0 || change.status.status != ComputeState::Ready {
            return Err(StackError::Rejected(format!("change {} is not ready", change_id)));
        }
        if change.executed {
            return Err(StackError::Rejected(format!(
                "change {} was already executed",
                change_id
            )));
        }
        let template = change
            .transformed
            .clone()
            .ok_or_else(|| StackError::Protocol(format!("change {} has no template", change_id)))?;
        change.executed = true;
        let stack_name = change.stack_name.clone();

        let record = state
            .stacks
            .get_mut(&stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.clone()))?;
        record.state = StackState::Executing;
        record.reason = None;
        record.apply = Some(PendingApply {
            template,
            remaining_polls: self.apply_polls,
            failure: record.fail_next_apply.take(),
        });
        Ok(())
    }

    async fn get_stack_status(&self, stack_name: &str) -> Result<StackStatus, StackError> {
        let mut state = self.state.lock().await;
        let record = state
            .stacks
            .get_mut(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;
        let settled = match record.apply.as_mut() {
            Some(apply) if apply.remaining_polls > 0 => {
                apply.remaining_polls -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        let finished = if settled { record.apply.take() } else { None };
        if let Some(apply) = finished {
            match apply.failure {
                Some(reason) => {
                    record.state = StackState::Failed;
                    record.reason = Some(reason);
                }
                None => {
                    record.deployed = Some(apply.template);
                    record.state = StackState::Applied;
                }
            }
            record.in_flight = None;
        }
        Ok(StackStatus {
            status: record.state,
            reason: record.reason.clone(),
        })
    }
}
