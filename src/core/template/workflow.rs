//! Structural checks on a state-machine definition.
//!
//! A definition is accepted when it names a declared `StartAt` state, declares at
//! least one state, and every transition (`Next`, `Default`, `Choices[].Next`,
//! `Catch[].Next`) lands on a declared state. Every state must either transition
//! somewhere or be terminal. `Parallel` branches and `Map` processors are nested
//! definitions checked against their own state set.

use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow is not valid JSON: {0}")]
    Parse(String),
    #[error("{scope} must be a JSON object")]
    NotAnObject { scope: String },
    #[error("{scope} is missing a StartAt state")]
    MissingStartAt { scope: String },
    #[error("{scope} must declare a non-empty States mapping")]
    MissingStates { scope: String },
    #[error("{scope} starts at undeclared state '{start}'")]
    UnknownStartAt { scope: String, start: String },
    #[error("state '{state}' is malformed: {reason}")]
    MalformedState { state: String, reason: String },
    #[error("state '{state}' transitions to undeclared state '{target}'")]
    UnknownTarget { state: String, target: String },
    #[error("state '{state}' has no transition and is not terminal")]
    Dangling { state: String },
}

/// A workflow document that passed [`validate_workflow`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    value: Value,
}

impl WorkflowDefinition {
    pub fn parse(bytes: &[u8]) -> Result<Self, WorkflowError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|err| WorkflowError::Parse(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, WorkflowError> {
        validate_workflow(&value)?;
        Ok(Self { value })
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn start_at(&self) -> &str {
        self.value
            .get("StartAt")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Compact JSON text, key order preserved.
    pub fn to_definition_string(&self) -> String {
        self.value.to_string()
    }
}

pub fn validate_workflow(value: &Value) -> Result<(), WorkflowError> {
    validate_scope(value, "workflow")
}

fn validate_scope(value: &Value, scope: &str) -> Result<(), WorkflowError> {
    let root = value.as_object().ok_or_else(|| WorkflowError::NotAnObject {
        scope: scope.to_string(),
    })?;
    let start = root
        .get("StartAt")
        .and_then(Value::as_str)
        .filter(|start| !start.is_empty())
        .ok_or_else(|| WorkflowError::MissingStartAt {
            scope: scope.to_string(),
        })?;
    let states = root
        .get("States")
        .and_then(Value::as_object)
        .filter(|states| !states.is_empty())
        .ok_or_else(|| WorkflowError::MissingStates {
            scope: scope.to_string(),
        })?;

    let declared: HashSet<&str> = states.keys().map(String::as_str).collect();
    if !declared.contains(start) {
        return Err(WorkflowError::UnknownStartAt {
            scope: scope.to_string(),
            start: start.to_string(),
        });
    }

    for (name, state) in states {
        let qualified = qualify(scope, name);
        let state = state
            .as_object()
            .ok_or_else(|| malformed(&qualified, "state must be a mapping"))?;
        validate_state(&qualified, state, &declared)?;
    }
    Ok(())
}

fn validate_state(
    name: &str,
    state: &Map<String, Value>,
    declared: &HashSet<&str>,
) -> Result<(), WorkflowError> {
    let state_type = state
        .get("Type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(name, "missing Type"))?;

    let mut targets = Vec::new();
    if let Some(next) = optional_str(name, state, "Next")? {
        targets.push(next);
    }

    let terminal = match state_type {
        "Succeed" | "Fail" => true,
        "Choice" => {
            let choices = state
                .get("Choices")
                .and_then(Value::as_array)
                .filter(|choices| !choices.is_empty())
                .ok_or_else(|| malformed(name, "Choice state needs a non-empty Choices list"))?;
            for choice in choices {
                let next = choice
                    .get("Next")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed(name, "every choice rule needs a Next"))?;
                targets.push(next);
            }
            if let Some(default) = optional_str(name, state, "Default")? {
                targets.push(default);
            }
            false
        }
        _ => match state.get("End") {
            None => false,
            Some(Value::Bool(end)) => *end,
            Some(_) => return Err(malformed(name, "End must be a boolean")),
        },
    };

    if let Some(catchers) = state.get("Catch") {
        let catchers = catchers
            .as_array()
            .ok_or_else(|| malformed(name, "Catch must be a list"))?;
        for catcher in catchers {
            let next = catcher
                .get("Next")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(name, "every Catch entry needs a Next"))?;
            targets.push(next);
        }
    }

    for target in &targets {
        if !declared.contains(target) {
            return Err(WorkflowError::UnknownTarget {
                state: name.to_string(),
                target: target.to_string(),
            });
        }
    }

    // Catch targets alone do not advance the normal flow.
    let transitions = state.contains_key("Next") || (state_type == "Choice");
    if !transitions && !terminal {
        return Err(WorkflowError::Dangling {
            state: name.to_string(),
        });
    }

    match state_type {
        "Parallel" => {
            let branches = state
                .get("Branches")
                .and_then(Value::as_array)
                .filter(|branches| !branches.is_empty())
                .ok_or_else(|| malformed(name, "Parallel state needs a non-empty Branches list"))?;
            for (index, branch) in branches.iter().enumerate() {
                validate_scope(branch, &format!("{}.Branches[{}]", name, index))?;
            }
        }
        "Map" => {
            let processor = state
                .get("ItemProcessor")
                .or_else(|| state.get("Iterator"))
                .ok_or_else(|| malformed(name, "Map state needs an ItemProcessor"))?;
            validate_scope(processor, &format!("{}.ItemProcessor", name))?;
        }
        _ => {}
    }

    Ok(())
}

fn optional_str<'a>(
    name: &str,
    state: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a str>, WorkflowError> {
    match state.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(malformed(name, &format!("{} must be a state name", field))),
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope == "workflow" {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn malformed(state: &str, reason: &str) -> WorkflowError {
    WorkflowError::MalformedState {
        state: state.to_string(),
        reason: reason.to_string(),
    }
}
