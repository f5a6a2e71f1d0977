use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DispatchError;
use crate::reduce::{parse_pairs, KeyValuePair};
use crate::target::Target;

pub const PARAM_RESOURCE: &str = "resource";
pub const PARAM_OPERATION: &str = "operation";
pub const PARAM_ADDITIONAL_FIELDS: &str = "additionalFields";

/// Read-only parameter lookup supplied by the execution host, keyed by
/// parameter name and input item index.
pub trait ParameterSource {
    fn item_count(&self) -> usize;

    /// `Ok(None)` when the host has no value for `name` at `index`.
    fn parameter(&self, name: &str, index: usize) -> Result<Option<Value>>;
}

impl<T: ParameterSource + ?Sized> ParameterSource for &T {
    fn item_count(&self) -> usize {
        (**self).item_count()
    }

    fn parameter(&self, name: &str, index: usize) -> Result<Option<Value>> {
        (**self).parameter(name, index)
    }
}

/// In-memory parameters: shared node-level values plus one object per input
/// item. An item value shadows the shared value of the same name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JsonParameters {
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

impl JsonParameters {
    pub fn new(parameters: Map<String, Value>, items: Vec<Map<String, Value>>) -> Self {
        Self { parameters, items }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| anyhow!("parameter document must be {{ parameters, items }}: {err}"))
    }
}

impl ParameterSource for JsonParameters {
    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn parameter(&self, name: &str, index: usize) -> Result<Option<Value>> {
        if index >= self.items.len().max(1) {
            return Err(anyhow!(
                "item index {index} out of range ({} items)",
                self.items.len()
            ));
        }
        let value = self
            .items
            .get(index)
            .and_then(|item| item.get(name))
            .or_else(|| self.parameters.get(name))
            .filter(|value| !value.is_null())
            .cloned();
        Ok(value)
    }
}

/// Caller-supplied overlay. The `propertiesUi` / `contextUi` key/value lists
/// and the raw `timestamp` are split out; `rest` holds the flat fields that
/// get merged onto the payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdditionalFields {
    pub timestamp: Option<String>,
    pub properties: Vec<KeyValuePair>,
    pub context: Vec<KeyValuePair>,
    pub rest: Map<String, Value>,
}

impl AdditionalFields {
    pub fn from_value(value: Value, target: Target) -> Result<Self, DispatchError> {
        let target_name = target.to_string();
        let mut map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => {
                return Err(DispatchError::invalid(
                    PARAM_ADDITIONAL_FIELDS,
                    target,
                    "expected an object",
                ))
            }
        };

        let timestamp = match map.remove("timestamp") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => {
                return Err(DispatchError::InvalidTimestamp {
                    raw: other.to_string(),
                })
            }
        };

        let properties = ui_pairs(
            map.remove("propertiesUi"),
            "propertiesUi",
            "propertyValues",
            &target_name,
        )?;
        let context = ui_pairs(
            map.remove("contextUi"),
            "contextUi",
            "contextValues",
            &target_name,
        )?;

        Ok(Self {
            timestamp,
            properties,
            context,
            rest: map,
        })
    }
}

fn ui_pairs(
    ui: Option<Value>,
    ui_name: &str,
    list_name: &str,
    target: &str,
) -> Result<Vec<KeyValuePair>, DispatchError> {
    match ui {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(ui)) => parse_pairs(
            ui.get(list_name).unwrap_or(&Value::Null),
            &format!("{ui_name}.{list_name}"),
            target,
        ),
        Some(_) => Err(DispatchError::invalid(ui_name, target, "expected an object")),
    }
}

/// Typed accessors for one input item of one target.
pub struct Fields<'a> {
    source: &'a dyn ParameterSource,
    index: usize,
    target: Target,
}

impl<'a> Fields<'a> {
    pub fn new(source: &'a dyn ParameterSource, index: usize, target: Target) -> Self {
        Self {
            source,
            index,
            target,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn optional(&self, name: &str) -> Result<Option<Value>> {
        self.source.parameter(name, self.index)
    }

    pub fn required_value(&self, name: &str) -> Result<Value> {
        match self.optional(name)? {
            None => Err(DispatchError::missing(name, self.target).into()),
            Some(Value::String(text)) if text.is_empty() => {
                Err(DispatchError::missing(name, self.target).into())
            }
            Some(value) => Ok(value),
        }
    }

    /// Scalars are rendered as strings; objects and arrays are rejected.
    pub fn required_string(&self, name: &str) -> Result<String> {
        match self.required_value(name)? {
            Value::String(text) => Ok(text),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            _ => Err(DispatchError::invalid(name, self.target, "expected a string").into()),
        }
    }

    pub fn additional_fields(&self) -> Result<AdditionalFields> {
        let raw = self
            .optional(PARAM_ADDITIONAL_FIELDS)?
            .unwrap_or(Value::Null);
        Ok(AdditionalFields::from_value(raw, self.target)?)
    }
}
