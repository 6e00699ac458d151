pub mod config;
pub mod error;
pub mod hook;
pub mod location;
pub mod orchestrator;
pub mod stack;
pub mod store;
pub mod template;
pub mod types;

pub use config::{ConfigLoader, SplicerConfig};
pub use error::AppError;
pub use hook::{InvocationContext, TransformationHook, TransformationRequest, TransformationResponse};
pub use location::LocationReference;
pub use orchestrator::{ChangeOrchestrator, DeployError, DeployOutcome};
pub use types::*;
