use serde_json::json;
use splicer::core::template::{validate_workflow, WorkflowDefinition, WorkflowError};

#[test]
fn test_missing_start_at_is_rejected() {
    let err = validate_workflow(&json!({"States": {"A": {"Type": "Succeed"}}})).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingStartAt { .. }));
}

#[test]
fn test_empty_states_are_rejected() {
    let err = validate_workflow(&json!({"StartAt": "A", "States": {}})).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingStates { .. }));
}

#[test]
fn test_start_at_must_be_declared() {
    let err = validate_workflow(&json!({
        "StartAt": "Missing",
        "States": {"A": {"Type": "Succeed"}}
    }))
    .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::UnknownStartAt {
            scope: "workflow".to_string(),
            start: "Missing".to_string()
        }
    );
}

#[test]
fn test_undeclared_next_is_rejected() {
    let err = WorkflowDefinition::parse(br#"{"StartAt":"A","States":{"A":{"Type":"Pass","Next":"B"}}}"#)
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::UnknownTarget {
            state: "A".to_string(),
            target: "B".to_string()
        }
    );
}

#[test]
fn test_choice_and_catch_targets_are_checked() {
    let valid = json!({
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [{"Variable": "$.ok", "BooleanEquals": true, "Next": "Work"}],
                "Default": "Reject"
            },
            "Work": {
                "Type": "Task",
                "Resource": "arn:aws:lambda:eu-west-1:123:function:work",
                "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Reject"}],
                "Next": "Done"
            },
            "Reject": {"Type": "Fail", "Error": "Rejected"},
            "Done": {"Type": "Succeed"}
        }
    });
    assert!(validate_workflow(&valid).is_ok());

    let mut bad_default = valid.clone();
    bad_default["States"]["Route"]["Default"] = json!("Nowhere");
    assert!(matches!(
        validate_workflow(&bad_default).unwrap_err(),
        WorkflowError::UnknownTarget { ref target, .. } if target == "Nowhere"
    ));

    let mut bad_catch = valid;
    bad_catch["States"]["Work"]["Catch"][0]["Next"] = json!("Gone");
    assert!(matches!(
        validate_workflow(&bad_catch).unwrap_err(),
        WorkflowError::UnknownTarget { ref target, .. } if target == "Gone"
    ));
}

#[test]
fn test_state_without_transition_or_end_is_dangling() {
    let err = validate_workflow(&json!({
        "StartAt": "A",
        "States": {"A": {"Type": "Pass"}}
    }))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Dangling { .. }));
}

#[test]
fn test_map_processor_is_validated_as_its_own_scope() {
    let err = validate_workflow(&json!({
        "StartAt": "Each",
        "States": {
            "Each": {
                "Type": "Map",
                "End": true,
                "ItemProcessor": {"StartAt": "Item", "States": {"Item": {"Type": "Pass"}}}
            }
        }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::Dangling {
            state: "Each.ItemProcessor.Item".to_string()
        }
    );
}

#[test]
fn test_non_json_content_is_a_parse_error() {
    let err = WorkflowDefinition::parse(b"StartAt: A").unwrap_err();
    assert!(matches!(err, WorkflowError::Parse(_)));
}
