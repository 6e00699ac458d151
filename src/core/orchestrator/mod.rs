//! Deployment cycle: stage the workflow, propose a change, wait for it to be
//! computed, apply it when it is ready, and wait for the result.

pub mod clock;
pub mod poll;

pub use clock::{Clock, ManualClock, SystemClock};
pub use poll::{poll_until, PollError, PollPolicy, PollStep};

use crate::core::hook::HookParameters;
use crate::core::location::LocationReference;
use crate::core::stack::{
    ChangeId, ChangeProposal, ChangeStatus, ComputeState, ResourceChange, StackError,
    StackService, StackState, StackStatus,
};
use crate::core::store::ContentStore;
use crate::core::template::{check_template_parameters, WorkflowDefinition};
use crate::core::types::DEFAULT_TARGET_RESOURCE;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

const STACK_NAME_PATTERN: &str = r"^[A-Za-z][-A-Za-z0-9]{0,127}$";

/// Lifecycle of one change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeState {
    Submitted,
    Computing,
    Ready,
    Empty,
    Failed,
    Executing,
    Applied,
}

impl ChangeState {
    pub fn can_transition_to(self, next: ChangeState) -> bool {
        use ChangeState::*;
        matches!(
            (self, next),
            (Submitted, Computing)
                | (Computing, Ready)
                | (Computing, Empty)
                | (Computing, Failed)
                | (Ready, Executing)
                | (Executing, Applied)
                | (Executing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeState::Empty | ChangeState::Failed | ChangeState::Applied)
    }
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChangeState::Submitted => "submitted",
            ChangeState::Computing => "computing",
            ChangeState::Ready => "ready",
            ChangeState::Empty => "empty",
            ChangeState::Failed => "failed",
            ChangeState::Executing => "executing",
            ChangeState::Applied => "applied",
        };
        f.write_str(text)
    }
}

/// A change proposal tracked for a single deployment cycle.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    change_id: ChangeId,
    stack_name: String,
    state: ChangeState,
    history: Vec<(ChangeState, DateTime<Utc>)>,
}

impl ChangeRequest {
    pub fn new(change_id: ChangeId, stack_name: impl Into<String>) -> Self {
        Self {
            change_id,
            stack_name: stack_name.into(),
            state: ChangeState::Submitted,
            history: vec![(ChangeState::Submitted, Utc::now())],
        }
    }

    pub fn change_id(&self) -> &ChangeId {
        &self.change_id
    }

    pub fn state(&self) -> ChangeState {
        self.state
    }

    pub fn states(&self) -> Vec<ChangeState> {
        self.history.iter().map(|(state, _)| *state).collect()
    }

    pub fn transition(&mut self, next: ChangeState) -> Result<(), DeployError> {
        if !self.state.can_transition_to(next) {
            return Err(DeployError::Protocol(format!(
                "change {} on stack {} cannot move from {} to {}",
                self.change_id, self.stack_name, self.state, next
            )));
        }
        tracing::debug!(change_id = %self.change_id, from = %self.state, to = %next, "change state");
        self.state = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployPhase {
    Compute,
    Apply,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployPhase::Compute => f.write_str("change computation"),
            DeployPhase::Apply => f.write_str("change application"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("staging failed: {0}")]
    StageFailed(String),
    #[error("timed out waiting for {phase} of change {change_id} after {attempts} checks ({})", poll::human(.elapsed))]
    Timeout {
        phase: DeployPhase,
        change_id: ChangeId,
        attempts: u32,
        elapsed: Duration,
    },
    #[error("stack service error during {stage}: {source}")]
    Service {
        stage: &'static str,
        #[source]
        source: StackError,
    },
    #[error("deployment protocol violation: {0}")]
    Protocol(String),
}

impl DeployError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeployError::Timeout { .. })
    }
}

/// Final report of one deployment cycle that ran to a terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub stack_name: String,
    pub change_id: ChangeId,
    pub change_name: String,
    pub state: ChangeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub location: LocationReference,
    pub sha256: String,
    pub changes: Vec<ResourceChange>,
    pub transitions: Vec<ChangeState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeployOutcome {
    /// `applied` and `empty` both leave the stack running the requested content.
    pub fn is_success(&self) -> bool {
        matches!(self.state, ChangeState::Applied | ChangeState::Empty)
    }
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub container: String,
    pub target_resource: String,
    pub parameters: HookParameters,
    pub compute_poll: PollPolicy,
    pub apply_poll: PollPolicy,
}

impl DeploySettings {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            target_resource: DEFAULT_TARGET_RESOURCE.to_string(),
            parameters: HookParameters::default(),
            compute_poll: PollPolicy::default(),
            apply_poll: PollPolicy::default(),
        }
    }
}

/// Per-deployment extras.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub description: Option<String>,
    pub template: Option<Value>,
}

pub struct ChangeOrchestrator {
    store: Arc<dyn ContentStore>,
    stacks: Arc<dyn StackService>,
    clock: Arc<dyn Clock>,
    settings: DeploySettings,
}

impl ChangeOrchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        stacks: Arc<dyn StackService>,
        clock: Arc<dyn Clock>,
        settings: DeploySettings,
    ) -> Self {
        Self {
            store,
            stacks,
            clock,
            settings,
        }
    }

    pub async fn deploy(
        &self,
        stack_name: &str,
        document: &[u8],
        location_key: &str,
    ) -> Result<DeployOutcome, DeployError> {
        self.deploy_with(stack_name, document, location_key, &DeployOptions::default())
            .await
    }

    pub async fn deploy_with(
        &self,
        stack_name: &str,
        document: &[u8],
        location_key: &str,
        options: &DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let span = tracing::info_span!("deploy", stack = %stack_name, key = %location_key);
        self.run_cycle(stack_name, document, location_key, options)
            .instrument(span)
            .await
    }

    async fn run_cycle(
        &self,
        stack_name: &str,
        document: &[u8],
        location_key: &str,
        options: &DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let started_at = Utc::now();
        validate_stack_name(stack_name)?;
        if let Some(template) = &options.template {
            let supplied = [
                self.settings.parameters.location.as_str(),
                self.settings.parameters.target.as_str(),
            ];
            check_template_parameters(template, &supplied)
                .map_err(|err| DeployError::StageFailed(format!("template is not deployable: {}", err)))?;
        }
        let workflow = WorkflowDefinition::parse(document)
            .map_err(|err| DeployError::StageFailed(format!("workflow document is invalid: {}", err)))?;
        let sha256 = hex::encode(Sha256::digest(document));

        let location = self
            .store
            .put(&self.settings.container, location_key, document.to_vec())
            .await
            .map_err(|err| DeployError::StageFailed(err.to_string()))?;
        tracing::info!(location = %location, sha256 = %sha256, start_at = workflow.start_at(), "staged workflow");

        let proposal = self.proposal(stack_name, &location, options);
        let change_id = self
            .stacks
            .submit_change(&proposal)
            .await
            .map_err(|source| DeployError::Service {
                stage: "submit",
                source,
            })?;
        tracing::info!(change_id = %change_id, change_name = %proposal.change_name, "change submitted");

        let mut request = ChangeRequest::new(change_id.clone(), stack_name);
        request.transition(ChangeState::Computing)?;

        let computed = self.await_computed(&change_id).await?;
        let mut outcome = DeployOutcome {
            stack_name: stack_name.to_string(),
            change_id: change_id.clone(),
            change_name: proposal.change_name.clone(),
            state: ChangeState::Computing,
            reason: computed.reason.clone(),
            location,
            sha256,
            changes: computed.changes.clone(),
            transitions: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        match computed.status {
            ComputeState::Ready => request.transition(ChangeState::Ready)?,
            ComputeState::Empty => {
                request.transition(ChangeState::Empty)?;
                tracing::info!(change_id = %change_id, "change is empty; stack already up to date");
                return Ok(finish(outcome, &request));
            }
            ComputeState::Failed => {
                request.transition(ChangeState::Failed)?;
                tracing::warn!(change_id = %change_id, reason = ?computed.reason, "change computation failed");
                return Ok(finish(outcome, &request));
            }
            ComputeState::Computing => {
                return Err(DeployError::Protocol(
                    "computation finished in computing state".to_string(),
                ))
            }
        }

        if !computed
            .changes
            .iter()
            .any(|change| change.logical_id == proposal.target_resource)
        {
            tracing::warn!(
                change_id = %change_id,
                target_resource = %proposal.target_resource,
                "ready change does not modify the target resource"
            );
        }

        self.stacks
            .execute_change(&change_id)
            .await
            .map_err(|source| DeployError::Service {
                stage: "execute",
                source,
            })?;
        request.transition(ChangeState::Executing)?;
        tracing::info!(change_id = %change_id, "change executing");

        let applied = self.await_applied(stack_name, &change_id).await?;
        match applied.status {
            StackState::Applied => {
                request.transition(ChangeState::Applied)?;
                tracing::info!(change_id = %change_id, "change applied");
            }
            StackState::Failed => {
                request.transition(ChangeState::Failed)?;
                tracing::warn!(change_id = %change_id, reason = ?applied.reason, "change application failed");
            }
            StackState::Executing => {
                return Err(DeployError::Protocol(
                    "application finished in executing state".to_string(),
                ))
            }
        }
        outcome.reason = applied.reason;
        Ok(finish(outcome, &request))
    }

    fn proposal(
        &self,
        stack_name: &str,
        location: &LocationReference,
        options: &DeployOptions,
    ) -> ChangeProposal {
        let mut parameters = BTreeMap::new();
        parameters.insert(self.settings.parameters.location.clone(), location.to_string());
        parameters.insert(
            self.settings.parameters.target.clone(),
            self.settings.target_resource.clone(),
        );
        ChangeProposal {
            stack_name: stack_name.to_string(),
            change_name: ChangeProposal::generate_change_name(),
            description: options.description.clone(),
            location: location.clone(),
            target_resource: self.settings.target_resource.clone(),
            parameters,
            template: options.template.clone(),
        }
    }

    async fn await_computed(&self, change_id: &ChangeId) -> Result<ChangeStatus, DeployError> {
        let stacks = self.stacks.as_ref();
        let result = poll_until(self.clock.as_ref(), &self.settings.compute_poll, |attempt| async move {
            let status = stacks.get_change_status(change_id).await?;
            tracing::debug!(attempt, status = ?status.status, "polled change status");
            Ok::<_, StackError>(match status.status {
                ComputeState::Computing => PollStep::Pending,
                _ => PollStep::Done(status),
            })
        })
        .await;
        settle(result, DeployPhase::Compute, change_id, "compute")
    }

    async fn await_applied(
        &self,
        stack_name: &str,
        change_id: &ChangeId,
    ) -> Result<StackStatus, DeployError> {
        let stacks = self.stacks.as_ref();
        let result = poll_until(self.clock.as_ref(), &self.settings.apply_poll, |attempt| async move {
            let status = stacks.get_stack_status(stack_name).await?;
            tracing::debug!(attempt, status = ?status.status, "polled stack status");
            Ok::<_, StackError>(match status.status {
                StackState::Executing => PollStep::Pending,
                _ => PollStep::Done(status),
            })
        })
        .await;
        settle(result, DeployPhase::Apply, change_id, "apply")
    }
}

fn settle<T>(
    result: Result<(T, u32), PollError<StackError>>,
    phase: DeployPhase,
    change_id: &ChangeId,
    stage: &'static str,
) -> Result<T, DeployError> {
    match result {
        Ok((value, _)) => Ok(value),
        Err(PollError::Timeout { attempts, elapsed }) => {
            tracing::warn!(change_id = %change_id, attempts, "gave up waiting for {}", phase);
            Err(DeployError::Timeout {
                phase,
                change_id: change_id.clone(),
                attempts,
                elapsed,
            })
        }
        Err(PollError::Check(source)) => Err(DeployError::Service { stage, source }),
    }
}

fn finish(mut outcome: DeployOutcome, request: &ChangeRequest) -> DeployOutcome {
    outcome.state = request.state();
    outcome.transitions = request.states();
    outcome.finished_at = Utc::now();
    outcome
}

fn validate_stack_name(stack_name: &str) -> Result<(), DeployError> {
    let pattern = Regex::new(STACK_NAME_PATTERN)
        .map_err(|err| DeployError::StageFailed(format!("stack name pattern: {}", err)))?;
    if pattern.is_match(stack_name) {
        Ok(())
    } else {
        Err(DeployError::StageFailed(format!(
            "invalid stack name '{}': must start with a letter and contain only letters, digits and hyphens (max 128)",
            stack_name
        )))
    }
}
