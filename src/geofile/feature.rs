use std::{collections::HashMap, fmt};

/// Value of a single feature attribute. Parcel services only hand out strings, numbers and nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Null,
}

impl AttributeValue {
    /// Convert a JSON value. Booleans are kept as text, nested arrays and objects are dropped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(text) => Some(Self::Text(text.clone())),
            serde_json::Value::Number(number) => number.as_f64().map(Self::Number),
            serde_json::Value::Bool(flag) => Some(Self::Text(flag.to_string())),
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Null => serde_json::Value::Null,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(_) => false,
            Self::Null => true,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            // Lot numbers arrive as floats from some layers, print 12.0 as "12".
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                write!(f, "{}", *number as i64)
            }
            Self::Number(number) => write!(f, "{}", number),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

pub type FeatureMap = HashMap<String, AttributeValue>;

/// A parcel geometry with its attributes. Features have no stable id, they are addressed by
/// their position in the feature store.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: geo::Geometry,
    pub attributes: FeatureMap,
}

impl Feature {
    pub fn new(geometry: geo::Geometry, attributes: FeatureMap) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// Attribute rendered as text, `None` when it is missing, null or blank.
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        self.attributes
            .get(key)
            .filter(|value| !value.is_blank())
            .map(|value| value.to_string())
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: value,
            attributes: FeatureMap::new(),
        }
    }
}
