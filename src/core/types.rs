use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ValidationError,
    ConfigurationError,
    StoreError,
    StackServiceError,
    TimeoutError,
    SerializationError,
    IoError,
    InternalError,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

/// Stack parameter names used when submitting a change, mirrored by the hook.
pub const DEFAULT_LOCATION_PARAMETER: &str = "S3Key";
pub const DEFAULT_TARGET_PARAMETER: &str = "SMResource";
pub const DEFAULT_TARGET_RESOURCE: &str = "MyStateMachine";

/// Resource type that carries an injected definition.
pub const STATE_MACHINE_RESOURCE_TYPE: &str = "AWS::StepFunctions::StateMachine";

/// Property overwritten with the serialized workflow.
pub const DEFINITION_FIELD: &str = "DefinitionString";
