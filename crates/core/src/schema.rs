// Schema normalization for backend-reported tool definitions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::types::BackendName;

/// One entry of a flat parameter list schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.into()),
            description: None,
            required: None,
        }
    }
}

/// A schema exactly as a backend reported it.
///
/// The variant is decided while deserializing, so callers never need to
/// inspect a raw value to find out which representation they hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SchemaSource {
    /// Schema serialized to a string by the backend
    Text(String),
    /// `[{name, type, description, required}]`
    ParameterList(Vec<ParameterSpec>),
    /// Any other JSON value, usually a JSON Schema object
    Structured(Value),
    #[default]
    Missing,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceRepr {
    Text(String),
    ParameterList(Vec<ParameterSpec>),
    Structured(Value),
}

impl<'de> Deserialize<'de> for SchemaSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = Option::<SourceRepr>::deserialize(deserializer)?;
        Ok(match repr {
            None => Self::Missing,
            Some(SourceRepr::Text(text)) => Self::Text(text),
            Some(SourceRepr::ParameterList(params)) => Self::ParameterList(params),
            Some(SourceRepr::Structured(value)) => Self::Structured(value),
        })
    }
}

impl Serialize for SchemaSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::ParameterList(params) => params.serialize(serializer),
            Self::Structured(value) => value.serialize(serializer),
            Self::Missing => serializer.serialize_none(),
        }
    }
}

impl SchemaSource {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Text rendering used when the schema cannot be normalized
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::ParameterList(params) => {
                serde_json::to_string(params).unwrap_or_default()
            }
            Self::Structured(value) => value.to_string(),
            Self::Missing => String::new(),
        }
    }
}

impl From<Value> for SchemaSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("schema text is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("schema must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("'properties' must be an object")]
    InvalidProperties,

    #[error("'required' must be an array of strings")]
    InvalidRequired,
}

/// Tool schema in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schema {
    /// Normalized JSON object form
    Canonical(Map<String, Value>),
    /// Stringified passthrough of a schema that could not be normalized
    Opaque(String),
}

impl Default for Schema {
    fn default() -> Self {
        Self::Canonical(Map::new())
    }
}

impl Schema {
    /// Normalize a reported schema, degrading to `Opaque` on failure
    pub fn from_source(source: SchemaSource, backend: &BackendName, tool: &str) -> Self {
        match normalize(&source) {
            Ok(map) => Self::Canonical(map),
            Err(err) => {
                warn!(
                    backend = %backend,
                    tool = %tool,
                    error = %err,
                    "Schema could not be normalized, passing it through as text"
                );
                Self::Opaque(source.to_text())
            }
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Canonical(_))
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Canonical(map) => Some(map),
            Self::Opaque(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Canonical(map) => Value::Object(map.clone()),
            Self::Opaque(text) => Value::String(text.clone()),
        }
    }
}

/// Convert any known representation into the canonical object form
pub fn normalize(source: &SchemaSource) -> Result<Map<String, Value>, SchemaError> {
    match source {
        SchemaSource::Missing => Ok(Map::new()),
        SchemaSource::Text(text) => {
            let value: Value = serde_json::from_str(text)
                .map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
            normalize_value(value)
        }
        SchemaSource::ParameterList(params) => Ok(from_parameters(params)),
        SchemaSource::Structured(value) => normalize_value(value.clone()),
    }
}

fn normalize_value(value: Value) -> Result<Map<String, Value>, SchemaError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => return Err(SchemaError::NotAnObject(json_type_name(&other))),
    };

    let has_properties = match map.get("properties") {
        None => false,
        Some(Value::Object(_)) => true,
        Some(_) => return Err(SchemaError::InvalidProperties),
    };

    if let Some(required) = map.get("required") {
        let valid = required
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        if !valid {
            return Err(SchemaError::InvalidRequired);
        }
    }

    if has_properties && !map.contains_key("type") {
        map.insert("type".to_string(), json!("object"));
    }

    Ok(map)
}

fn from_parameters(params: &[ParameterSpec]) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        let mut property = Map::new();
        property.insert(
            "type".to_string(),
            json!(param.kind.as_deref().unwrap_or("string")),
        );
        if let Some(description) = &param.description {
            property.insert("description".to_string(), json!(description));
        }
        properties.insert(param.name.clone(), Value::Object(property));

        if param.required != Some(false) {
            required.push(json!(param.name));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), Value::Array(required));
    schema
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
