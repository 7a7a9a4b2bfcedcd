use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Declared type of a capability attribute or command argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueType {
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    String,
    /// Structured value (arrays of supported modes, color maps, ...).
    Json,
}

impl ValueType {
    pub const INTEGER: ValueType = ValueType::Integer {
        min: None,
        max: None,
    };
    pub const NUMBER: ValueType = ValueType::Number {
        min: None,
        max: None,
    };
    pub const PERCENT: ValueType = ValueType::Integer {
        min: Some(0),
        max: Some(100),
    };

    /// Type check a value reported by the cloud.
    ///
    /// Only the JSON shape is checked. Enum membership and ranges are not
    /// enforced on inbound data since devices regularly report values outside
    /// of their advertised constraints.
    pub fn parse(&self, value: &JsonValue) -> Result<AttributeValue, String> {
        match self {
            ValueType::Enum(_) | ValueType::String => value
                .as_str()
                .map(|s| AttributeValue::String(s.to_owned()))
                .ok_or_else(|| format!("expected string, got {}", json_kind(value))),
            ValueType::Integer { .. } => as_integer(value)
                .map(AttributeValue::Integer)
                .ok_or_else(|| format!("expected integer, got {}", json_kind(value))),
            ValueType::Number { .. } => value
                .as_f64()
                .map(AttributeValue::Number)
                .ok_or_else(|| format!("expected number, got {}", json_kind(value))),
            ValueType::Json => {
                if value.is_null() {
                    Err("expected value, got null".to_owned())
                } else {
                    Ok(AttributeValue::Json(value.clone()))
                }
            }
        }
    }

    /// Strict validation used for outgoing command arguments.
    pub fn validate(&self, value: &JsonValue) -> Result<AttributeValue, String> {
        let parsed = self.parse(value)?;
        match (self, &parsed) {
            (ValueType::Enum(allowed), AttributeValue::String(s)) => {
                if !allowed.contains(&s.as_str()) {
                    return Err(format!("[{}] is not one of {:?}", s, allowed));
                }
            }
            (ValueType::Integer { min, max }, AttributeValue::Integer(v)) => {
                if min.is_some_and(|min| *v < min) || max.is_some_and(|max| *v > max) {
                    return Err(format!("{} is out of range {:?}..={:?}", v, min, max));
                }
            }
            (ValueType::Number { min, max }, AttributeValue::Number(v)) => {
                if v.is_nan() || min.is_some_and(|min| *v < min) || max.is_some_and(|max| *v > max)
                {
                    return Err(format!("{} is out of range {:?}..={:?}", v, min, max));
                }
            }
            _ => {}
        }
        Ok(parsed)
    }
}

fn as_integer(value: &JsonValue) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// A typed attribute value as held in a device snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Number(f64),
    String(String),
    Json(JsonValue),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            AttributeValue::Integer(v) => JsonValue::from(*v),
            AttributeValue::Number(v) => JsonValue::from(*v),
            AttributeValue::String(s) => JsonValue::from(s.as_str()),
            AttributeValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Number(v) => write!(f, "{}", v),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_integral_floats() {
        assert_eq!(
            ValueType::PERCENT.parse(&json!(50.0)).unwrap(),
            AttributeValue::Integer(50)
        );
        assert!(ValueType::PERCENT.parse(&json!(50.5)).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let switch = ValueType::Enum(&["on", "off"]);
        assert!(switch.parse(&json!(42)).is_err());
        assert!(switch.parse(&JsonValue::Null).is_err());
        // membership is only enforced on validation
        assert!(switch.parse(&json!("dimmed")).is_ok());
        assert!(switch.validate(&json!("dimmed")).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ValueType::PERCENT.validate(&json!(100)).is_ok());
        assert!(ValueType::PERCENT.validate(&json!(101)).is_err());
        assert!(ValueType::PERCENT.validate(&json!(-1)).is_err());
        let setpoint = ValueType::Number {
            min: Some(-460.0),
            max: Some(10000.0),
        };
        assert!(setpoint.validate(&json!(21.5)).is_ok());
        assert!(setpoint.validate(&json!("21.5")).is_err());
    }
}
