//! Attribute schemas: the typed attributes a node or mark type declares,
//! with their defaults and their markup form.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::markup::MarkupElement;
use crate::model::Attrs;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrKind {
    String,
    /// A string or `null`; `null` is omitted from markup.
    OptionalString,
    Bool,
    Integer {
        min: i64,
        max: i64,
    },
    Number,
    Enum(Vec<String>),
    /// A structured value, stored as JSON text in markup.
    Json,
}

/// Where an attribute lives in markup.
#[derive(Debug, Clone)]
pub enum AttrSource {
    /// `data-<kebab-name>="..."`
    Data,
    /// A plain markup attribute, e.g. `src` or `href`.
    Html(&'static str),
    /// Derived from the element by hand, e.g. a heading level from its tag.
    Custom {
        parse: fn(&MarkupElement) -> Option<String>,
        render: fn(&Value) -> Vec<(String, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub name: String,
    pub kind: AttrKind,
    pub default: Value,
    pub source: AttrSource,
}

/// Result of reading one attribute from markup. `malformed` carries the raw
/// text when it could not be parsed and the default was substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrOutcome {
    pub value: Value,
    pub malformed: Option<String>,
}

impl AttrSpec {
    fn new(name: impl Into<String>, kind: AttrKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            source: AttrSource::Data,
        }
    }

    pub fn string(name: impl Into<String>, default: &str) -> Self {
        Self::new(name, AttrKind::String, Value::String(default.to_string()))
    }

    pub fn optional_string(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::OptionalString, Value::Null)
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, AttrKind::Bool, Value::Bool(default))
    }

    pub fn integer(name: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        Self::new(
            name,
            AttrKind::Integer { min, max },
            Value::Number(Number::from(default.clamp(min, max))),
        )
    }

    pub fn number(name: impl Into<String>, default: f64) -> Self {
        let default = Number::from_f64(default).map_or(Value::Null, Value::Number);
        Self::new(name, AttrKind::Number, default)
    }

    pub fn enumeration(name: impl Into<String>, values: &[&str], default: &str) -> Self {
        Self::new(
            name,
            AttrKind::Enum(values.iter().map(|v| v.to_string()).collect()),
            Value::String(default.to_string()),
        )
    }

    pub fn json(name: impl Into<String>, default: Value) -> Self {
        Self::new(name, AttrKind::Json, default)
    }

    pub fn html(mut self, attr: &'static str) -> Self {
        self.source = AttrSource::Html(attr);
        self
    }

    pub fn custom(
        mut self,
        parse: fn(&MarkupElement) -> Option<String>,
        render: fn(&Value) -> Vec<(String, String)>,
    ) -> Self {
        self.source = AttrSource::Custom { parse, render };
        self
    }

    /// `data-chart-type` for `chart_type`.
    pub fn data_attr_name(&self) -> String {
        format!("data-{}", self.name.replace('_', "-"))
    }

    /// Validates `value` for this attribute, clamping integers into range.
    /// `None` means the value has the wrong shape.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match &self.kind {
            AttrKind::String => value.is_string().then(|| value.clone()),
            AttrKind::OptionalString => {
                (value.is_string() || value.is_null()).then(|| value.clone())
            }
            AttrKind::Bool => value.is_boolean().then(|| value.clone()),
            AttrKind::Integer { min, max } => value
                .as_i64()
                .map(|n| Value::Number(Number::from(n.clamp(*min, *max)))),
            AttrKind::Number => value.is_number().then(|| value.clone()),
            AttrKind::Enum(values) => value
                .as_str()
                .filter(|s| values.iter().any(|v| v == s))
                .map(|_| value.clone()),
            AttrKind::Json => Some(value.clone()),
        }
    }

    /// Parses the markup text form of the attribute.
    pub fn parse_text(&self, raw: &str) -> Option<Value> {
        match &self.kind {
            AttrKind::String | AttrKind::OptionalString => Some(Value::String(raw.to_string())),
            AttrKind::Bool => match raw {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            AttrKind::Integer { min, max } => raw
                .trim()
                .parse::<i64>()
                .ok()
                .map(|n| Value::Number(Number::from(n.clamp(*min, *max)))),
            AttrKind::Number => {
                let raw = raw.trim();
                if let Ok(n) = raw.parse::<i64>() {
                    return Some(Value::Number(Number::from(n)));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
            AttrKind::Enum(values) => values
                .iter()
                .any(|v| v == raw)
                .then(|| Value::String(raw.to_string())),
            AttrKind::Json => serde_json::from_str(raw).ok(),
        }
    }

    /// Reads the attribute from a markup element. Total: a missing attribute
    /// yields the default, a malformed one yields the default and reports the
    /// raw text.
    pub fn deserialize(&self, el: &MarkupElement) -> AttrOutcome {
        let raw = match &self.source {
            AttrSource::Data => el.attr(&self.data_attr_name()).map(str::to_string),
            AttrSource::Html(name) => el.attr(name).map(str::to_string),
            AttrSource::Custom { parse, .. } => parse(el),
        };

        let Some(raw) = raw else {
            return AttrOutcome {
                value: self.default.clone(),
                malformed: None,
            };
        };

        match self.parse_text(&raw) {
            Some(value) => AttrOutcome {
                value,
                malformed: None,
            },
            None => AttrOutcome {
                value: self.default.clone(),
                malformed: Some(raw),
            },
        }
    }

    /// Markup attribute pairs for `value`. Depends on nothing but the value.
    pub fn serialize(&self, value: &Value) -> Vec<(String, String)> {
        let text = match (&self.kind, value) {
            (_, Value::Null) if self.kind != AttrKind::Json => return Vec::new(),
            (AttrKind::Json, value) => value.to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, other) => other.to_string(),
        };

        match &self.source {
            AttrSource::Data => vec![(self.data_attr_name(), text)],
            AttrSource::Html(name) => vec![(name.to_string(), text)],
            AttrSource::Custom { render, .. } => render(value),
        }
    }
}

/// Fills every attribute declared in `specs` that `attrs` lacks.
pub fn fill_defaults(specs: &[AttrSpec], attrs: &mut Attrs) {
    for spec in specs {
        if !attrs.contains_key(&spec.name) {
            attrs.insert(spec.name.clone(), spec.default.clone());
        }
    }
}

/// Reads an attribute map into a typed view.
pub fn read_attrs<T: DeserializeOwned>(attrs: &Attrs) -> Result<T, serde_json::Error> {
    let object: serde_json::Map<String, Value> =
        attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(Value::Object(object))
}

/// Converts a typed view back into an attribute map.
pub fn write_attrs<T: Serialize>(value: &T) -> Result<Attrs, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object.into_iter().collect()),
        other => Err(serde::ser::Error::custom(format!(
            "expected an attribute object, got {other}"
        ))),
    }
}
