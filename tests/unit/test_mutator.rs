use serde_json::{json, Value};
use splicer::core::location::LocationReference;
use splicer::core::store::{ContentStore, MemoryContentStore};
use splicer::core::template::{DocumentMutator, MutationError, TemplateDocument};

const WORKFLOW: &str = r#"{"StartAt":"A","States":{"A":{"Type":"Pass","End":true}}}"#;

fn location() -> LocationReference {
    "s3://bucket/workflows/v1.json".parse().unwrap()
}

fn template() -> Value {
    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Transform": ["InjectStateMachineDefinition"],
        "Resources": {
            "Role": {"Type": "AWS::IAM::Role", "Properties": {"Path": "/"}},
            "MyStateMachine": {
                "Type": "AWS::StepFunctions::StateMachine",
                "Properties": {"RoleArn": "arn:aws:iam::123:role/sm", "DefinitionString": "placeholder"}
            }
        },
        "Outputs": {"Arn": {"Value": "x"}}
    })
}

async fn store_with(body: &str) -> MemoryContentStore {
    let store = MemoryContentStore::new();
    store
        .put("bucket", "workflows/v1.json", body.as_bytes().to_vec())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_inject_sets_definition_to_exact_document_text() {
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_value(template()).unwrap();

    let mutated = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap();

    assert_eq!(
        mutated["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"],
        json!(WORKFLOW)
    );
}

#[tokio::test]
async fn test_inject_changes_only_the_definition_field() {
    let pretty = "{\n  \"StartAt\": \"A\",\n  \"States\": {\"A\": {\"Type\": \"Succeed\"}}\n}";
    let store = store_with(pretty).await;
    let original = template();
    let document = TemplateDocument::from_value(original.clone()).unwrap();

    let mutated = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap();

    let definition = mutated["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"]
        .as_str()
        .unwrap()
        .to_string();
    let parsed: Value = serde_json::from_str(&definition).unwrap();
    assert_eq!(parsed, serde_json::from_str::<Value>(pretty).unwrap());

    let mut expected = original;
    expected["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"] = json!(definition);
    assert_eq!(mutated, expected);
    let top_keys: Vec<&String> = mutated.as_object().unwrap().keys().collect();
    assert_eq!(
        top_keys,
        vec!["AWSTemplateFormatVersion", "Transform", "Resources", "Outputs"]
    );
    assert_eq!(document.as_value()["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"], json!("placeholder"));
}

#[tokio::test]
async fn test_missing_target_fails_without_reading_store() {
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_value(template()).unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "Missing", &store)
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::ResourceNotFound { ref name } if name == "Missing"));
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_duplicate_resource_names_are_ambiguous() {
    let raw = r#"{
        "Resources": {
            "MyStateMachine": {"Type": "AWS::StepFunctions::StateMachine", "Properties": {}},
            "MyStateMachine": {"Type": "AWS::StepFunctions::StateMachine", "Properties": {}}
        }
    }"#;
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_slice(raw.as_bytes()).unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::AmbiguousResource { count: 2, .. }));
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_wrong_resource_type_is_rejected() {
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_value(template()).unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "Role", &store)
        .await
        .unwrap_err();

    match err {
        MutationError::WrongResourceType { actual, expected, .. } => {
            assert_eq!(actual, "AWS::IAM::Role");
            assert_eq!(expected, "AWS::StepFunctions::StateMachine");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_undeclared_transition_is_invalid_content() {
    let store = store_with(r#"{"StartAt":"A","States":{"A":{"Type":"Pass","Next":"B"}}}"#).await;
    let document = TemplateDocument::from_value(template()).unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::InvalidWorkflowContent(_)));
    assert_eq!(
        document.as_value()["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"],
        json!("placeholder")
    );
}

#[tokio::test]
async fn test_fetch_failures_keep_not_found_and_access_denied_apart() {
    let document = TemplateDocument::from_value(template()).unwrap();
    let store = MemoryContentStore::new();

    let missing = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();
    match missing {
        MutationError::ContentFetchError { source, .. } => assert!(source.is_not_found()),
        other => panic!("unexpected error: {:?}", other),
    }

    store
        .put("bucket", "workflows/v1.json", WORKFLOW.as_bytes().to_vec())
        .await
        .unwrap();
    store.deny_reads(location());
    let denied = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();
    match denied {
        MutationError::ContentFetchError { source, .. } => assert!(source.is_access_denied()),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_textual_definition_field_is_malformed() {
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_value(json!({
        "Resources": {
            "MyStateMachine": {
                "Type": "AWS::StepFunctions::StateMachine",
                "Properties": {"DefinitionString": {"Fn::Sub": "x"}}
            }
        }
    }))
    .unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::MalformedDocument(_)));
}

#[test]
fn test_resources_must_be_a_mapping() {
    let err = TemplateDocument::from_value(json!({"Resources": ["a", "b"]})).unwrap_err();
    assert!(matches!(err, MutationError::MalformedDocument(_)));
    let err = TemplateDocument::from_value(json!({"Resources": {"A": "not-an-object"}})).unwrap_err();
    assert!(matches!(err, MutationError::MalformedDocument(_)));
}

#[tokio::test]
async fn test_yaml_templates_are_accepted() {
    let yaml = r#"
Resources:
  MyStateMachine:
    Type: AWS::StepFunctions::StateMachine
    Properties:
      DefinitionString: placeholder
"#;
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_text(yaml).unwrap();
    let mutated = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap();
    assert_eq!(
        mutated["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"],
        json!(WORKFLOW)
    );
}

#[tokio::test]
async fn test_unrelated_numbers_pass_through_unchanged() {
    let raw = r#"{"Resources":{"Alarm":{"Type":"AWS::CloudWatch::Alarm","Properties":{"Threshold":1.50,"Period":6E1,"EvaluationPeriods":3}},"MyStateMachine":{"Type":"AWS::StepFunctions::StateMachine","Properties":{"DefinitionString":"placeholder"}}}}"#;
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_slice(raw.as_bytes()).unwrap();

    let mutated = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap();

    let alarm = serde_json::to_string(&mutated["Resources"]["Alarm"]).unwrap();
    assert_eq!(
        alarm,
        r#"{"Type":"AWS::CloudWatch::Alarm","Properties":{"Threshold":1.50,"Period":6E1,"EvaluationPeriods":3}}"#
    );
    let expected = raw.replace(
        r#""DefinitionString":"placeholder""#,
        &format!(r#""DefinitionString":{}"#, serde_json::to_string(WORKFLOW).unwrap()),
    );
    assert_eq!(serde_json::to_string(&mutated).unwrap(), expected);
}

#[tokio::test]
async fn test_duplicate_yaml_resource_names_are_ambiguous() {
    let yaml = r#"
Resources:
  MyStateMachine:
    Type: AWS::StepFunctions::StateMachine
    Properties: {}
  MyStateMachine:
    Type: AWS::StepFunctions::StateMachine
    Properties: {}
"#;
    let store = store_with(WORKFLOW).await;
    let document = TemplateDocument::from_text(yaml).unwrap();

    let err = DocumentMutator::default()
        .inject(&document, &location(), "MyStateMachine", &store)
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::AmbiguousResource { count: 2, .. }));
    assert_eq!(store.read_count(), 0);
}
