use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateParameterError {
    #[error("parameter '{0}' is not declared in the template Parameters section")]
    Missing(String),
    #[error("template parameter '{0}' has no Default and is not supplied by the deployment")]
    NoDefault(String),
    #[error("template Parameters must be a mapping")]
    Malformed,
}

/// Check that every name in `supplied` is declared under `Parameters` and
/// that all other declared parameters carry a `Default`.
///
/// A template without a `Parameters` section declares nothing.
pub fn check_template_parameters(
    template: &Value,
    supplied: &[&str],
) -> Result<(), TemplateParameterError> {
    let declared = match template.get("Parameters") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err(TemplateParameterError::Malformed),
    };

    for name in supplied {
        let present = declared
            .and_then(|map| map.get(*name))
            .map_or(false, |definition| !definition.is_null());
        if !present {
            return Err(TemplateParameterError::Missing((*name).to_string()));
        }
    }

    let Some(declared) = declared else {
        return Ok(());
    };
    for (name, definition) in declared {
        if supplied.contains(&name.as_str()) {
            continue;
        }
        let has_default = definition
            .get("Default")
            .map_or(false, |default| !default.is_null());
        if !has_default {
            return Err(TemplateParameterError::NoDefault(name.clone()));
        }
    }
    Ok(())
}
