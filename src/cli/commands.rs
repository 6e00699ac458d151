use crate::cli::args::{DeployArgs, ServeArgs, SimulateArgs, TransformArgs, ValidateArgs};
use crate::cli::context::{clock_for, Runtime, StackHandle};
use crate::core::hook::server::{serve_hook, ServerSettings};
use crate::core::location::LocationReference;
use crate::core::orchestrator::{ChangeOrchestrator, DeployError, DeployOptions, DeployOutcome};
use crate::core::store::ContentStore;
use crate::core::template::{TemplateDocument, WorkflowDefinition};
use crate::Result;
use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn deploy(config: Option<PathBuf>, args: DeployArgs) -> Result<()> {
    let runtime = Runtime::load(config.as_deref())?;
    let document = read_document(&runtime.resolve(&args.file))?;
    let template = args
        .template
        .as_deref()
        .map(|path| read_template(&runtime.resolve(path)))
        .transpose()?;

    let store = runtime.store()?;
    let stacks = runtime.stacks(store.clone()).await?;
    if let (StackHandle::Local { service, .. }, Some(template)) = (&stacks, &template) {
        service.register_stack(args.stack.clone(), template.clone()).await;
    }

    let mut settings = runtime.deploy_settings();
    if let Some(container) = args.container {
        settings.container = container;
    }
    if let Some(target) = args.target {
        settings.target_resource = target;
    }
    let options = DeployOptions {
        description: args.description,
        template,
    };
    let orchestrator = ChangeOrchestrator::new(store, stacks.service(), clock_for(&stacks), settings);
    let result = orchestrator
        .deploy_with(&args.stack, &document, &args.key, &options)
        .await;
    stacks.save().await?;
    report(result, args.json)
}

pub async fn simulate(config: Option<PathBuf>, args: SimulateArgs) -> Result<()> {
    let runtime = Runtime::load(config.as_deref())?;
    let document = read_document(&runtime.resolve(&args.file))?;
    let template = read_template(&runtime.resolve(&args.template))?;
    let state_file = runtime.resolve(
        args.state_file
            .as_deref()
            .unwrap_or(runtime.config.stack.state_file.as_path()),
    );

    let store: Arc<dyn ContentStore> = Arc::new(runtime.fs_store());
    let stacks = runtime.local_stacks(store.clone(), state_file).await?;
    if let StackHandle::Local { service, .. } = &stacks {
        service.register_stack(args.stack.clone(), template.clone()).await;
    }

    let options = DeployOptions {
        description: None,
        template: Some(template),
    };
    let orchestrator = ChangeOrchestrator::new(
        store,
        stacks.service(),
        clock_for(&stacks),
        runtime.deploy_settings(),
    );
    let result = orchestrator
        .deploy_with(&args.stack, &document, &args.key, &options)
        .await;
    stacks.save().await?;
    report(result, args.json)
}

pub async fn transform(config: Option<PathBuf>, args: TransformArgs) -> Result<()> {
    let runtime = Runtime::load(config.as_deref())?;
    let template_path = runtime.resolve(&args.template);
    let text = std::fs::read_to_string(&template_path)
        .with_context(|| format!("failed to read template {}", template_path.display()))?;
    let document = TemplateDocument::from_text(&text)
        .with_context(|| format!("template {} is not usable", template_path.display()))?;
    let location: LocationReference = args
        .location
        .parse()
        .with_context(|| format!("invalid --location '{}'", args.location))?;
    let target = args
        .target
        .unwrap_or_else(|| runtime.config.hook.target_resource.clone());

    let store = runtime.store()?;
    let mutated = runtime
        .mutator()
        .inject(&document, &location, &target, store.as_ref())
        .await
        .map_err(|err| anyhow!("[{}] {}", err.kind(), err))?;
    let rendered = serde_json::to_string_pretty(&mutated)?;

    match args.output {
        Some(path) => {
            let path = runtime.resolve(&path);
            std::fs::write(&path, format!("{}\n", rendered))
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(output = %path.display(), "wrote transformed template");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

pub async fn validate(args: ValidateArgs) -> Result<()> {
    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let workflow = WorkflowDefinition::parse(&bytes)
        .with_context(|| format!("{} is not a valid workflow", args.path.display()))?;
    let states = workflow
        .as_value()
        .get("States")
        .and_then(Value::as_object)
        .map(|states| states.len())
        .unwrap_or(0);
    println!(
        "{}: valid ({} states, starts at {})",
        args.path.display(),
        states,
        workflow.start_at()
    );
    Ok(())
}

pub async fn serve(config: Option<PathBuf>, args: ServeArgs) -> Result<()> {
    let runtime = Runtime::load(config.as_deref())?;
    let store = runtime.store()?;
    let settings = ServerSettings {
        bind: args.bind.unwrap_or_else(|| runtime.config.server.bind.clone()),
        max_body_bytes: runtime.config.server.max_body_bytes,
    };
    serve_hook(runtime.hook(store), settings).await?;
    Ok(())
}

fn read_document(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read workflow document {}", path.display()))
}

fn read_template(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    let document = TemplateDocument::from_text(&text)
        .with_context(|| format!("template {} is not usable", path.display()))?;
    Ok(document.into_value())
}

fn report(result: std::result::Result<DeployOutcome, DeployError>, json: bool) -> Result<()> {
    let outcome = match result {
        Ok(outcome) => outcome,
        // The change is still in flight on the stack service side.
        Err(err) if err.is_timeout() => {
            return Err(anyhow!(err).context(
                "deployment failed; the change was left in place and can be inspected or re-run",
            ))
        }
        Err(err) => return Err(anyhow!(err).context("deployment failed")),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    if outcome.is_success() {
        return Ok(());
    }
    bail!(
        "change {} on stack {} {}: {}",
        outcome.change_id,
        outcome.stack_name,
        outcome.state,
        outcome
            .reason
            .as_deref()
            .unwrap_or("the stack service gave no reason")
    )
}

fn print_outcome(outcome: &DeployOutcome) {
    println!(
        "stack {}: {} (change {})",
        outcome.stack_name, outcome.state, outcome.change_id
    );
    println!("  location: {}", outcome.location);
    println!("  sha256:   {}", outcome.sha256);
    for change in &outcome.changes {
        println!("  {:?} {}", change.action, change.logical_id);
    }
    if let Some(reason) = &outcome.reason {
        println!("  reason:   {}", reason);
    }
}
