use async_trait::async_trait;
use serde_json::{json, Value};
use splicer::core::hook::{HookParameters, TransformationHook};
use splicer::core::location::LocationReference;
use splicer::core::orchestrator::{
    ChangeOrchestrator, ChangeState, DeployError, DeployOptions, DeployPhase, DeploySettings,
    ManualClock, PollPolicy,
};
use splicer::core::stack::{
    ChangeAction, ChangeId, ChangeProposal, ChangeStatus, ComputeState, LocalStackService,
    ResourceChange, StackError, StackService, StackState, StackStatus,
};
use splicer::core::store::{ContentStore, MemoryContentStore};
use splicer::core::template::DocumentMutator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STACK: &str = "orders-prod";
const WORKFLOW_V1: &str = r#"{"StartAt":"Charge","States":{"Charge":{"Type":"Pass","Next":"Done"},"Done":{"Type":"Succeed"}}}"#;
const WORKFLOW_V2: &str = r#"{"StartAt":"Charge","States":{"Charge":{"Type":"Pass","Result":"v2","Next":"Done"},"Done":{"Type":"Succeed"}}}"#;

fn template() -> Value {
    json!({
        "Transform": ["InjectStateMachineDefinition"],
        "Parameters": {"S3Key": {"Type": "String"}, "SMResource": {"Type": "String"}},
        "Resources": {
            "MyStateMachine": {
                "Type": "AWS::StepFunctions::StateMachine",
                "Properties": {"RoleArn": "arn:aws:iam::1:role/sm"}
            }
        }
    })
}

fn fast_policy() -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(4),
        multiplier: 2.0,
        max_attempts: 10,
        max_elapsed: Duration::from_secs(60),
    }
}

fn settings() -> DeploySettings {
    let mut settings = DeploySettings::new("workflows");
    settings.compute_poll = fast_policy();
    settings.apply_poll = fast_policy();
    settings
}

struct Harness {
    store: Arc<MemoryContentStore>,
    stacks: Arc<LocalStackService>,
    clock: Arc<ManualClock>,
    orchestrator: ChangeOrchestrator,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryContentStore::new());
    let hook = Arc::new(TransformationHook::new(
        store.clone(),
        DocumentMutator::default(),
        HookParameters::default(),
    ));
    let stacks = Arc::new(LocalStackService::new(hook).with_poll_delays(2, 1));
    stacks.register_stack(STACK, template()).await;
    let clock = Arc::new(ManualClock::new());
    let orchestrator =
        ChangeOrchestrator::new(store.clone(), stacks.clone(), clock.clone(), settings());
    Harness {
        store,
        stacks,
        clock,
        orchestrator,
    }
}

#[tokio::test]
async fn test_first_deploy_applies_and_repeat_is_empty() {
    let h = harness().await;

    let first = h
        .orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap();
    assert_eq!(first.state, ChangeState::Applied);
    assert!(first.is_success());
    assert_eq!(
        first.transitions,
        vec![
            ChangeState::Submitted,
            ChangeState::Computing,
            ChangeState::Ready,
            ChangeState::Executing,
            ChangeState::Applied
        ]
    );
    assert_eq!(first.location.to_string(), "s3://workflows/orders/v1.json");
    assert_eq!(first.sha256.len(), 64);
    assert!(first
        .changes
        .iter()
        .any(|change| change.logical_id == "MyStateMachine" && change.action == ChangeAction::Add));

    let deployed = h.stacks.deployed_template(STACK).await.unwrap();
    assert_eq!(
        deployed["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"],
        json!(WORKFLOW_V1)
    );

    let second = h
        .orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap();
    assert_eq!(second.state, ChangeState::Empty);
    assert!(second.is_success());
    assert!(second.changes.is_empty());
    assert_ne!(first.change_id, second.change_id);
    assert_ne!(first.change_name, second.change_name);
}

#[tokio::test]
async fn test_new_content_modifies_target() {
    let h = harness().await;
    h.orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .deploy(STACK, WORKFLOW_V2.as_bytes(), "orders/v2.json")
        .await
        .unwrap();
    assert_eq!(outcome.state, ChangeState::Applied);
    assert_eq!(outcome.changes.len(), 1);
    assert_eq!(outcome.changes[0].logical_id, "MyStateMachine");
    assert_eq!(outcome.changes[0].action, ChangeAction::Modify);
    assert!(!h.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_compute_failure_is_reported_without_execution() {
    let h = harness().await;
    let mut settings = settings();
    settings.target_resource = "NotThere".to_string();
    let orchestrator =
        ChangeOrchestrator::new(h.store.clone(), h.stacks.clone(), h.clock.clone(), settings);

    let outcome = orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap();
    assert_eq!(outcome.state, ChangeState::Failed);
    assert!(!outcome.is_success());
    assert!(!outcome.transitions.contains(&ChangeState::Executing));
    let reason = outcome.reason.unwrap();
    assert!(reason.starts_with("[ResourceNotFound]"), "{}", reason);
    assert!(h.stacks.deployed_template(STACK).await.is_none());
}

#[tokio::test]
async fn test_apply_failure_is_reported() {
    let h = harness().await;
    h.stacks
        .fail_next_apply(STACK, "state machine role cannot be assumed")
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap();
    assert_eq!(outcome.state, ChangeState::Failed);
    assert!(outcome.transitions.contains(&ChangeState::Executing));
    assert_eq!(
        outcome.reason.as_deref(),
        Some("state machine role cannot be assumed")
    );
}

#[tokio::test]
async fn test_invalid_inputs_fail_before_staging() {
    let h = harness().await;

    let err = h
        .orchestrator
        .deploy(STACK, br#"{"StartAt":"A","States":{"A":{"Type":"Pass","Next":"B"}}}"#, "bad.json")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::StageFailed(_)), "{}", err);

    let err = h
        .orchestrator
        .deploy("1-not-a-stack", WORKFLOW_V1.as_bytes(), "ok.json")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::StageFailed(_)), "{}", err);

    for key in ["bad.json", "ok.json"] {
        let location = LocationReference::new("workflows", key).unwrap();
        assert!(!h.store.contains(&location));
    }
}

#[tokio::test]
async fn test_submit_rejected_while_change_in_flight() {
    let h = harness().await;
    let pending = ChangeProposal {
        stack_name: STACK.to_string(),
        change_name: ChangeProposal::generate_change_name(),
        description: None,
        location: "s3://workflows/orders/v1.json".parse().unwrap(),
        target_resource: "MyStateMachine".to_string(),
        parameters: Default::default(),
        template: None,
    };
    h.stacks.submit_change(&pending).await.unwrap();

    let err = h
        .orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap_err();
    match err {
        DeployError::Service { stage, source } => {
            assert_eq!(stage, "submit");
            assert!(matches!(source, StackError::Rejected(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_unknown_stack_is_a_service_error() {
    let h = harness().await;
    let err = h
        .orchestrator
        .deploy("unknown-stack", WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Service {
            source: StackError::StackNotFound(_),
            ..
        }
    ));
}

/// Service whose change never leaves `computing`.
#[derive(Default)]
struct StuckStackService {
    polls: AtomicUsize,
    executes: AtomicUsize,
    proposals: Mutex<Vec<ChangeProposal>>,
}

#[async_trait]
impl StackService for StuckStackService {
    async fn submit_change(&self, proposal: &ChangeProposal) -> Result<ChangeId, StackError> {
        self.proposals.lock().unwrap().push(proposal.clone());
        Ok(ChangeId::new("stuck-1"))
    }

    async fn get_change_status(&self, _change_id: &ChangeId) -> Result<ChangeStatus, StackError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(ChangeStatus {
            status: ComputeState::Computing,
            reason: None,
            changes: Vec::new(),
        })
    }

    async fn execute_change(&self, _change_id: &ChangeId) -> Result<(), StackError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_stack_status(&self, _stack_name: &str) -> Result<StackStatus, StackError> {
        Ok(StackStatus {
            status: StackState::Applied,
            reason: None,
        })
    }
}

#[tokio::test]
async fn test_stuck_computation_times_out_without_execute() {
    let store = Arc::new(MemoryContentStore::new());
    let stacks = Arc::new(StuckStackService::default());
    let clock = Arc::new(ManualClock::new());
    let mut settings = settings();
    settings.compute_poll.max_attempts = 5;
    let orchestrator =
        ChangeOrchestrator::new(store.clone(), stacks.clone(), clock.clone(), settings);

    let options = DeployOptions {
        description: Some("commit 4f2a9c1".to_string()),
        template: None,
    };
    let err = orchestrator
        .deploy_with(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json", &options)
        .await
        .unwrap_err();

    match err {
        DeployError::Timeout {
            phase, attempts, ..
        } => {
            assert_eq!(phase, DeployPhase::Compute);
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(stacks.polls.load(Ordering::SeqCst), 5);
    assert_eq!(stacks.executes.load(Ordering::SeqCst), 0);
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4)
        ]
    );

    let proposals = stacks.proposals.lock().unwrap();
    let proposal = &proposals[0];
    assert_eq!(proposal.description.as_deref(), Some("commit 4f2a9c1"));
    assert_eq!(
        proposal.parameters.get("S3Key").map(String::as_str),
        Some("s3://workflows/orders/v1.json")
    );
    assert_eq!(
        proposal.parameters.get("SMResource").map(String::as_str),
        Some("MyStateMachine")
    );
    assert!(store.contains(&proposal.location));
}

/// Computes a ready change at once, then never finishes applying it.
#[derive(Default)]
struct EndlessApplyService {
    stack_polls: AtomicUsize,
    executes: AtomicUsize,
}

#[async_trait]
impl StackService for EndlessApplyService {
    async fn submit_change(&self, _proposal: &ChangeProposal) -> Result<ChangeId, StackError> {
        Ok(ChangeId::new("endless-1"))
    }

    async fn get_change_status(&self, _change_id: &ChangeId) -> Result<ChangeStatus, StackError> {
        Ok(ChangeStatus {
            status: ComputeState::Ready,
            reason: None,
            changes: vec![ResourceChange {
                logical_id: "MyStateMachine".to_string(),
                action: ChangeAction::Modify,
                resource_type: Some("AWS::StepFunctions::StateMachine".to_string()),
            }],
        })
    }

    async fn execute_change(&self, _change_id: &ChangeId) -> Result<(), StackError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_stack_status(&self, _stack_name: &str) -> Result<StackStatus, StackError> {
        self.stack_polls.fetch_add(1, Ordering::SeqCst);
        Ok(StackStatus {
            status: StackState::Executing,
            reason: None,
        })
    }
}

#[tokio::test]
async fn test_endless_apply_times_out_in_apply_phase() {
    let store = Arc::new(MemoryContentStore::new());
    let stacks = Arc::new(EndlessApplyService::default());
    let clock = Arc::new(ManualClock::new());
    let mut settings = settings();
    settings.apply_poll.max_attempts = 4;
    let orchestrator = ChangeOrchestrator::new(store, stacks.clone(), clock.clone(), settings);

    let err = orchestrator
        .deploy(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json")
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    match err {
        DeployError::Timeout {
            phase,
            change_id,
            attempts,
            ..
        } => {
            assert_eq!(phase, DeployPhase::Apply);
            assert_eq!(change_id, ChangeId::new("endless-1"));
            assert_eq!(attempts, 4);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(stacks.executes.load(Ordering::SeqCst), 1);
    assert_eq!(stacks.stack_polls.load(Ordering::SeqCst), 4);
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[tokio::test]
async fn test_template_missing_target_parameter_is_not_staged() {
    let h = harness().await;
    let mut bare = template();
    bare["Parameters"]
        .as_object_mut()
        .unwrap()
        .remove("SMResource");
    let options = DeployOptions {
        description: None,
        template: Some(bare),
    };

    let err = h
        .orchestrator
        .deploy_with(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json", &options)
        .await
        .unwrap_err();

    assert!(!err.is_timeout());
    match err {
        DeployError::StageFailed(message) => assert!(message.contains("'SMResource'"), "{}", message),
        other => panic!("unexpected error: {}", other),
    }
    let location = LocationReference::new("workflows", "orders/v1.json").unwrap();
    assert!(!h.store.contains(&location));
    assert!(h.stacks.deployed_template(STACK).await.is_none());
}

#[tokio::test]
async fn test_template_extra_parameter_without_default_is_not_staged() {
    let h = harness().await;
    let mut extra = template();
    extra["Parameters"]["Stage"] = json!({"Type": "String"});
    extra["Parameters"]["Region"] = json!({"Type": "String", "Default": "eu-west-1"});
    let options = DeployOptions {
        description: None,
        template: Some(extra),
    };

    let err = h
        .orchestrator
        .deploy_with(STACK, WORKFLOW_V1.as_bytes(), "orders/v1.json", &options)
        .await
        .unwrap_err();

    match err {
        DeployError::StageFailed(message) => {
            assert!(message.contains("'Stage' has no Default"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
    let location = LocationReference::new("workflows", "orders/v1.json").unwrap();
    assert!(!h.store.contains(&location));
}
