pub mod args;
pub mod commands;
pub mod context;

pub use args::{DeployArgs, ServeArgs, SimulateArgs, TransformArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "splicer")]
#[command(version = crate::VERSION)]
#[command(about = "Inject stored state-machine definitions into stack templates and deploy them")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a workflow, simulate the change locally, then deploy it."
)]
pub struct Args {
    /// Path to config file (default: ./splicer.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Stage a workflow and drive a change through the stack service",
        long_about = "Deploy uploads the workflow document, proposes a change for the stack, waits for it to be computed, applies it when ready, and waits for the result.",
        after_help = "Example:\n    splicer deploy --stack orders --file workflow.json --key workflows/v1.json"
    )]
    Deploy(DeployArgs),
    #[command(
        about = "Inject a stored workflow into a template locally",
        long_about = "Transform runs the document mutator against a local template and prints the result without contacting the stack service.",
        after_help = "Example:\n    splicer transform --template stack.yaml --location s3://bucket/workflows/v1.json"
    )]
    Transform(TransformArgs),
    #[command(
        about = "Check a workflow document",
        long_about = "Validate parses the document and checks that every transition targets a declared state.",
        after_help = "Example:\n    splicer validate workflow.json"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Expose the transformation hook over HTTP",
        long_about = "Serve answers POST /transform with transformation responses and GET /healthz with ok.",
        after_help = "Example:\n    splicer serve --bind 0.0.0.0:8080"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Run a full deploy cycle against the local simulator",
        long_about = "Simulate stages into the filesystem store and runs the change through an in-process stack service whose state persists between runs.",
        after_help = "Example:\n    splicer simulate --template stack.json --file workflow.json --key workflows/v1.json"
    )]
    Simulate(SimulateArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    let config = args.config;
    match args.command {
        Command::Deploy(deploy_args) => commands::deploy(config, deploy_args).await,
        Command::Transform(transform_args) => commands::transform(config, transform_args).await,
        Command::Validate(validate_args) => commands::validate(validate_args).await,
        Command::Serve(serve_args) => commands::serve(config, serve_args).await,
        Command::Simulate(simulate_args) => commands::simulate(config, simulate_args).await,
    }
}
