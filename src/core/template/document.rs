use super::MutationError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

const RESOURCES_SECTION: &str = "Resources";

/// A parsed stack template together with an ordered view of its resource entries.
///
/// When built from raw bytes the entry list keeps duplicate resource names, which a
/// plain JSON map would silently collapse into the last occurrence.
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    root: Value,
    resources: Vec<(String, Value)>,
}

impl TemplateDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MutationError> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|err| MutationError::MalformedDocument(format!("invalid JSON: {}", err)))?;
        ensure_object_root(&root)?;
        let index: ResourceIndex = serde_json::from_slice(bytes).map_err(index_error)?;
        Self::build(root, index.into_entries()?)
    }

    pub fn from_value(root: Value) -> Result<Self, MutationError> {
        ensure_object_root(&root)?;
        let resources = match root.get(RESOURCES_SECTION) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, body)| (name.clone(), body.clone()))
                .collect(),
            Some(_) => {
                return Err(MutationError::MalformedDocument(format!(
                    "{} must be a mapping of resource name to definition",
                    RESOURCES_SECTION
                )))
            }
            None => return Err(missing_resources()),
        };
        Self::build(root, resources)
    }

    /// Parse a JSON or YAML template from text. Like [`Self::from_slice`], the
    /// resource entries keep duplicate names.
    pub fn from_text(text: &str) -> Result<Self, MutationError> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            return Self::from_slice(trimmed.as_bytes());
        }
        let root: Value = serde_yaml::from_str(text)
            .map_err(|err| MutationError::MalformedDocument(format!("invalid YAML: {}", err)))?;
        ensure_object_root(&root)?;
        let index: ResourceIndex = serde_yaml::from_str(text).map_err(index_error)?;
        Self::build(root, index.into_entries()?)
    }

    fn build(root: Value, resources: Vec<(String, Value)>) -> Result<Self, MutationError> {
        for (name, body) in &resources {
            if !body.is_object() {
                return Err(MutationError::MalformedDocument(format!(
                    "resource '{}' must be a mapping",
                    name
                )));
            }
        }
        Ok(Self { root, resources })
    }

    pub fn resources(&self) -> &[(String, Value)] {
        &self.resources
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub(crate) fn resources_mut(root: &mut Value) -> Option<&mut Map<String, Value>> {
        root.get_mut(RESOURCES_SECTION).and_then(Value::as_object_mut)
    }
}

fn ensure_object_root(root: &Value) -> Result<(), MutationError> {
    if root.is_object() {
        Ok(())
    } else {
        Err(MutationError::MalformedDocument(
            "template must be a mapping at the top level".to_string(),
        ))
    }
}

fn missing_resources() -> MutationError {
    MutationError::MalformedDocument(format!("template has no {} section", RESOURCES_SECTION))
}

fn index_error(err: impl fmt::Display) -> MutationError {
    MutationError::MalformedDocument(format!(
        "{} must map resource names to definitions: {}",
        RESOURCES_SECTION, err
    ))
}

#[derive(Deserialize)]
struct ResourceIndex {
    #[serde(rename = "Resources", default)]
    resources: Option<OrderedEntries>,
}

impl ResourceIndex {
    fn into_entries(self) -> Result<Vec<(String, Value)>, MutationError> {
        self.resources
            .map(|entries| entries.0)
            .ok_or_else(missing_resources)
    }
}

/// Map entries in source order, duplicates included.
struct OrderedEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of resource name to definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, body)) = access.next_entry::<String, Value>()? {
                    entries.push((name, body));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
