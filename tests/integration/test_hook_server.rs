use serde_json::{json, Value};
use splicer::core::hook::server::{serve_hook_with_ready_notifier, ServerSettings};
use splicer::core::hook::{HookParameters, TransformationHook};
use splicer::core::store::{ContentStore, MemoryContentStore};
use splicer::core::template::DocumentMutator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

const WORKFLOW: &str = r#"{"StartAt":"Only","States":{"Only":{"Type":"Succeed"}}}"#;

async fn start_server(max_body_bytes: usize) -> SocketAddr {
    let store = Arc::new(MemoryContentStore::new());
    store
        .put("releases", "orders/v3.json", WORKFLOW.as_bytes().to_vec())
        .await
        .unwrap();
    let hook = Arc::new(TransformationHook::new(
        store,
        DocumentMutator::default(),
        HookParameters::default(),
    ));
    let settings = ServerSettings {
        bind: "127.0.0.1:0".to_string(),
        max_body_bytes,
    };
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = serve_hook_with_ready_notifier(hook, settings, tx).await;
    });
    rx.await.expect("server should report its address")
}

fn transform_body(request_id: &str) -> Value {
    json!({
        "requestId": request_id,
        "region": "eu-west-1",
        "accountId": "123456789012",
        "transformId": "123456789012::InjectStateMachineDefinition",
        "fragment": {
            "Resources": {
                "MyStateMachine": {
                    "Type": "AWS::StepFunctions::StateMachine",
                    "Properties": {}
                }
            }
        },
        "params": {"S3Key": "s3://releases/orders/v3.json", "SMResource": "MyStateMachine"},
        "templateParameterValues": {}
    })
}

#[tokio::test]
async fn test_transform_endpoint_returns_hook_response() {
    let addr = start_server(1024 * 1024).await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/transform", addr))
        .json(&transform_body("srv-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requestId"], "srv-1");
    assert_eq!(body["status"], "success");
    assert_eq!(
        body["fragment"]["Resources"]["MyStateMachine"]["Properties"]["DefinitionString"],
        json!(WORKFLOW)
    );
}

#[tokio::test]
async fn test_hook_failures_are_still_http_200() {
    let addr = start_server(1024 * 1024).await;
    let mut body = transform_body("srv-2");
    body["params"]["SMResource"] = json!("Nope");
    let response = reqwest::Client::new()
        .post(format!("http://{}/transform", addr))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failure");
    assert!(body["errorMessage"]
        .as_str()
        .unwrap()
        .starts_with("[ResourceNotFound]"));
}

#[tokio::test]
async fn test_unparseable_request_is_rejected() {
    let addr = start_server(1024 * 1024).await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/transform", addr))
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SPL-HOOK-400");
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let addr = start_server(256).await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/transform", addr))
        .json(&transform_body(&"x".repeat(512)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SPL-HOOK-413");
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_server(1024).await;
    let response = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}
