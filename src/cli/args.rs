use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_SIMULATED_STACK: &str = "local-stack";

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Stack to update
    #[arg(long, value_name = "NAME")]
    pub stack: String,

    /// Local workflow document (JSON) to stage
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// Object key the document is staged under
    #[arg(long, value_name = "KEY")]
    pub key: String,

    /// Container override (default: store.container)
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,

    /// Target resource override (default: hook.target_resource)
    #[arg(long, value_name = "NAME")]
    pub target: Option<String>,

    /// Free-form change description, e.g. a commit id
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    /// Template (JSON or YAML) submitted with the change
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long, help_heading = "Output Options")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Template (JSON or YAML) to transform
    #[arg(long, value_name = "FILE")]
    pub template: PathBuf,

    /// Workflow location, s3://container/key
    #[arg(long, value_name = "LOCATION")]
    pub location: String,

    /// Target resource override (default: hook.target_resource)
    #[arg(long, value_name = "NAME")]
    pub target: Option<String>,

    /// Write the mutated template here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Workflow document to check
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address override (default: server.bind)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Template (JSON or YAML) registered for the simulated stack
    #[arg(long, value_name = "FILE")]
    pub template: PathBuf,

    /// Local workflow document (JSON) to stage
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// Object key the document is staged under
    #[arg(long, value_name = "KEY")]
    pub key: String,

    /// Simulated stack name
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SIMULATED_STACK)]
    pub stack: String,

    /// Simulator state file override (default: stack.state_file)
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long, help_heading = "Output Options")]
    pub json: bool,
}
