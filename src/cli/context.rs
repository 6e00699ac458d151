#![allow(clippy::result_large_err)]

use crate::core::config::{ConfigLoader, SplicerConfig, StackBackend, StoreBackend};
use crate::core::error::AppError;
use crate::core::hook::TransformationHook;
use crate::core::orchestrator::{Clock, DeploySettings};
use crate::core::stack::{HttpStackService, LocalStackService, LocalStackSnapshot, StackService};
use crate::core::store::{ContentStore, FsContentStore, HttpContentStore};
use crate::core::template::DocumentMutator;
use crate::core::types::ErrorCategory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Resolved configuration plus the working directory relative paths resolve against.
pub struct Runtime {
    pub config: SplicerConfig,
    pub workdir: PathBuf,
}

/// Stack service chosen by `stack.backend`. The local simulator keeps a handle so
/// its state can be written back after the command.
pub enum StackHandle {
    Local {
        service: Arc<LocalStackService>,
        state_file: PathBuf,
    },
    Remote(Arc<dyn StackService>),
}

impl StackHandle {
    pub fn service(&self) -> Arc<dyn StackService> {
        match self {
            StackHandle::Local { service, .. } => service.clone() as Arc<dyn StackService>,
            StackHandle::Remote(service) => service.clone(),
        }
    }
}

impl Runtime {
    pub fn load(config_path: Option<&Path>) -> Result<Self, AppError> {
        let workdir = std::env::current_dir().map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("cannot determine working directory: {}", err),
            )
        })?;
        let config = ConfigLoader::load(config_path, &workdir)?;
        Ok(Self { config, workdir })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    pub fn store(&self) -> Result<Arc<dyn ContentStore>, AppError> {
        let store = &self.config.store;
        match store.backend {
            StoreBackend::Fs => Ok(Arc::new(self.fs_store())),
            StoreBackend::Http => {
                let endpoint = parse_endpoint("store.endpoint", store.endpoint.as_deref())?;
                let client = HttpContentStore::new(endpoint, store.timeout)
                    .map_err(|err| {
                        AppError::new(ErrorCategory::StoreError, err.to_string())
                            .with_code("SPL-STORE-001")
                    })?
                    .with_storage_class(store.storage_class)
                    .with_auth_token(store.auth_token.clone());
                Ok(Arc::new(client))
            }
        }
    }

    pub fn fs_store(&self) -> FsContentStore {
        FsContentStore::new(self.resolve(&self.config.store.root))
    }

    pub fn mutator(&self) -> DocumentMutator {
        DocumentMutator::new(
            self.config.hook.resource_type.clone(),
            self.config.hook.definition_field.clone(),
        )
    }

    pub fn hook(&self, store: Arc<dyn ContentStore>) -> Arc<TransformationHook> {
        Arc::new(TransformationHook::new(
            store,
            self.mutator(),
            self.config.hook.parameters(),
        ))
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            container: self.config.store.container.clone(),
            target_resource: self.config.hook.target_resource.clone(),
            parameters: self.config.hook.parameters(),
            compute_poll: self.config.poll.compute.clone(),
            apply_poll: self.config.poll.apply.clone(),
        }
    }

    pub async fn stacks(&self, store: Arc<dyn ContentStore>) -> Result<StackHandle, AppError> {
        let stack = &self.config.stack;
        match stack.backend {
            StackBackend::Local => {
                let state_file = self.resolve(&stack.state_file);
                self.local_stacks(store, state_file).await
            }
            StackBackend::Http => {
                let endpoint = parse_endpoint("stack.endpoint", stack.endpoint.as_deref())?;
                let client = HttpStackService::new(endpoint, stack.timeout)
                    .map_err(|err| {
                        AppError::new(ErrorCategory::StackServiceError, err.to_string())
                            .with_code("SPL-STACK-001")
                    })?
                    .with_auth_token(stack.auth_token.clone());
                Ok(StackHandle::Remote(Arc::new(client)))
            }
        }
    }

    /// Simulator backed by `state_file`, restored from disk when the file exists.
    pub async fn local_stacks(
        &self,
        store: Arc<dyn ContentStore>,
        state_file: PathBuf,
    ) -> Result<StackHandle, AppError> {
        let service = LocalStackService::new(self.hook(store))
            .with_poll_delays(self.config.stack.compute_polls, self.config.stack.apply_polls);
        if let Some(snapshot) = read_snapshot(&state_file)? {
            service.restore(snapshot).await;
        }
        Ok(StackHandle::Local {
            service: Arc::new(service),
            state_file,
        })
    }
}

impl StackHandle {
    /// Persist simulator state; a no-op for remote services.
    pub async fn save(&self) -> Result<(), AppError> {
        let StackHandle::Local { service, state_file } = self else {
            return Ok(());
        };
        let snapshot = service.snapshot().await;
        let encoded = serde_json::to_vec_pretty(&snapshot).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to encode simulator state: {}", err),
            )
        })?;
        if let Some(parent) = state_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = state_file.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, state_file)?;
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<Option<LocalStackSnapshot>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let snapshot = serde_json::from_slice(&bytes).map_err(|err| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("simulator state {} is unreadable: {}", path.display(), err),
        )
        .with_code("SPL-STACK-002")
        .with_suggestion("delete the state file to start from an empty simulator")
    })?;
    Ok(Some(snapshot))
}

fn parse_endpoint(name: &str, endpoint: Option<&str>) -> Result<Url, AppError> {
    let endpoint = endpoint.ok_or_else(|| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("{} is required for the http backend", name),
        )
        .with_code("SPL-CFG-004")
    })?;
    Url::parse(endpoint).map_err(|err| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid {}: {}", name, err),
        )
        .with_code("SPL-CFG-004")
    })
}

/// Clock used by commands that drive a deploy cycle.
pub fn clock_for(handle: &StackHandle) -> Arc<dyn Clock> {
    match handle {
        // Simulated changes settle by poll count, not elapsed time.
        StackHandle::Local { .. } => Arc::new(crate::core::orchestrator::ManualClock::new()),
        StackHandle::Remote(_) => Arc::new(crate::core::orchestrator::SystemClock),
    }
}
