pub mod loader;

pub use loader::ConfigLoader;

use crate::core::hook::HookParameters;
use crate::core::orchestrator::PollPolicy;
use crate::core::store::StorageClass;
use crate::core::types::{
    DEFAULT_LOCATION_PARAMETER, DEFAULT_TARGET_PARAMETER, DEFAULT_TARGET_RESOURCE,
    DEFINITION_FIELD, STATE_MACHINE_RESOURCE_TYPE,
};
use crate::core::orchestrator::poll::duration_text;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration loaded from splicer.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SplicerConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub stack: StackConfig,

    #[serde(default)]
    pub hook: HookConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fs,
    Http,
}

/// Where workflow documents are staged and read back from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Root directory for the `fs` backend
    pub root: PathBuf,

    /// Base URL for the `http` backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Container (bucket) that receives staged documents
    pub container: String,

    pub storage_class: StorageClass,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(with = "duration_text")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StackBackend {
    #[default]
    Local,
    Http,
}

/// Stack-management service used by `deploy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub backend: StackBackend,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(with = "duration_text")]
    pub timeout: Duration,

    /// Simulator state persisted between runs (`local` backend)
    pub state_file: PathBuf,

    /// Status checks that report `computing` before a simulated change settles
    pub compute_polls: u32,

    /// Status checks that report `executing` before a simulated apply settles
    pub apply_polls: u32,
}

/// Names the hook resolves and the resource it rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub location_parameter: String,
    pub target_parameter: String,
    pub target_resource: String,
    pub resource_type: String,
    pub definition_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PollConfig {
    pub compute: PollPolicy,
    pub apply: PollPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_body_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Fs,
            root: PathBuf::from(".splicer/store"),
            endpoint: None,
            container: "workflows".to_string(),
            storage_class: StorageClass::Standard,
            auth_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            backend: StackBackend::Local,
            endpoint: None,
            auth_token: None,
            timeout: Duration::from_secs(30),
            state_file: PathBuf::from(".splicer/stacks.json"),
            compute_polls: 1,
            apply_polls: 1,
        }
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        HookConfig {
            location_parameter: DEFAULT_LOCATION_PARAMETER.to_string(),
            target_parameter: DEFAULT_TARGET_PARAMETER.to_string(),
            target_resource: DEFAULT_TARGET_RESOURCE.to_string(),
            resource_type: STATE_MACHINE_RESOURCE_TYPE.to_string(),
            definition_field: DEFINITION_FIELD.to_string(),
        }
    }
}

impl HookConfig {
    pub fn parameters(&self) -> HookParameters {
        HookParameters {
            location: self.location_parameter.clone(),
            target: self.target_parameter.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: 5 * 1024 * 1024,
        }
    }
}
