use serial_test::serial;
use splicer::core::config::{ConfigLoader, StackBackend, StoreBackend};
use splicer::core::store::StorageClass;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn clear_splicer_env() {
    for v in &[
        "SPLICER_STORE_BACKEND",
        "SPLICER_STORE_ROOT",
        "SPLICER_STORE_ENDPOINT",
        "SPLICER_STORE_CONTAINER",
        "SPLICER_STORE_STORAGE_CLASS",
        "SPLICER_STORE_TOKEN",
        "SPLICER_STACK_BACKEND",
        "SPLICER_STACK_ENDPOINT",
        "SPLICER_STACK_TOKEN",
        "SPLICER_STACK_STATE_FILE",
        "SPLICER_HOOK_TARGET_RESOURCE",
        "SPLICER_POLL_MAX_ELAPSED",
        "SPLICER_SERVER_BIND",
    ] {
        env::remove_var(v);
    }
}

#[test]
#[serial]
fn test_config_file_sections_are_applied() {
    clear_splicer_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("splicer.toml"),
        r#"
[store]
backend = "http"
endpoint = "https://objects.example.com/"
container = "release-workflows"
storage_class = "STANDARD_IA"

[stack]
backend = "http"
endpoint = "https://stacks.example.com/api"

[hook]
target_resource = "OrdersStateMachine"

[poll.compute]
initial_interval = "500ms"
max_interval = "5s"
max_elapsed = "2m"

[server]
bind = "0.0.0.0:9000"

[logging]
default_level = "debug"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    assert_eq!(config.store.backend, StoreBackend::Http);
    assert_eq!(config.store.container, "release-workflows");
    assert_eq!(config.store.storage_class, StorageClass::StandardIa);
    assert_eq!(config.stack.backend, StackBackend::Http);
    assert_eq!(config.hook.target_resource, "OrdersStateMachine");
    assert_eq!(config.poll.compute.initial_interval, Duration::from_millis(500));
    assert_eq!(config.poll.compute.max_elapsed, Duration::from_secs(120));
    assert_eq!(config.poll.compute.max_attempts, 120);
    assert_eq!(config.poll.apply.initial_interval, Duration::from_secs(2));
    assert_eq!(config.server.bind, "0.0.0.0:9000");
}

#[test]
#[serial]
fn test_env_overrides_take_precedence() {
    clear_splicer_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("splicer.toml"),
        "[store]\ncontainer = \"from-file\"\n",
    )
    .unwrap();

    env::set_var("SPLICER_STORE_CONTAINER", "from-env");
    env::set_var("SPLICER_STORE_STORAGE_CLASS", "onezone_ia");
    env::set_var("SPLICER_POLL_MAX_ELAPSED", "90s");
    let config = ConfigLoader::load(None, temp_dir.path());
    clear_splicer_env();

    let config = config.unwrap();
    assert_eq!(config.store.container, "from-env");
    assert_eq!(config.store.storage_class, StorageClass::OnezoneIa);
    assert_eq!(config.poll.compute.max_elapsed, Duration::from_secs(90));
    assert_eq!(config.poll.apply.max_elapsed, Duration::from_secs(90));
}

#[test]
#[serial]
fn test_invalid_storage_class_is_rejected() {
    clear_splicer_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("splicer.toml"),
        "[store]\nstorage_class = \"GLACIER\"\n",
    )
    .unwrap();

    let err = ConfigLoader::load(None, temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "SPL-CFG-002");
}

#[test]
#[serial]
fn test_invalid_duration_and_bind_are_rejected() {
    clear_splicer_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");

    fs::write(&path, "[poll.apply]\nmax_elapsed = \"forever\"\n").unwrap();
    assert!(ConfigLoader::load(Some(&path), temp_dir.path()).is_err());

    fs::write(&path, "[server]\nbind = \"not-an-address\"\n").unwrap();
    let err = ConfigLoader::load(Some(&path), temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "SPL-CFG-004");
}

#[test]
#[serial]
fn test_zero_attempts_fails_validation() {
    clear_splicer_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("splicer.toml"),
        "[poll.compute]\nmax_attempts = 0\n",
    )
    .unwrap();
    let err = ConfigLoader::load(None, temp_dir.path()).unwrap_err();
    assert!(err.message.contains("poll.compute.max_attempts"));
}
