use crate::cli::Command;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Long-running hook listener (`splicer serve`).
    Server,
    /// One-shot commands whose stdout carries the command result.
    OneShot,
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Serve(_) => ExecutionContext::Server,
        Command::Deploy(_)
        | Command::Transform(_)
        | Command::Validate(_)
        | Command::Simulate(_) => ExecutionContext::OneShot,
    }
}
