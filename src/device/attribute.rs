//! Device attribute values and settings.

use serde::{Deserialize, Serialize};

/// Value of a device attribute.
///
/// Deserialized untagged, so YAML `9600`, `0.5` and `"ascii"` map to
/// `Int`, `Float` and `Text` respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Compare a read-back value against the value that was set.
    ///
    /// Integers compare exactly. A float on either side compares by value,
    /// so an integer read-back matches an integral float setting.
    pub fn matches(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Whether the value can be verified after a write. NaN and infinities
    /// cannot.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A named attribute to set (and verify) on a device handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSetting {
    /// Attribute name as understood by the backend (e.g. `baud_rate`).
    pub name: String,
    /// Value to set.
    pub value: AttributeValue,
}

impl AttributeSetting {
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_match_across_variants() {
        assert!(AttributeValue::Int(9600).matches(&AttributeValue::Float(9600.0)));
        assert!(AttributeValue::Float(0.5).matches(&AttributeValue::Float(0.5)));
        assert!(!AttributeValue::Int(9600).matches(&AttributeValue::Int(19200)));
    }

    #[test]
    fn test_large_ints_compare_exactly() {
        let set = AttributeValue::Int(9_007_199_254_740_993);
        assert!(!set.matches(&AttributeValue::Int(9_007_199_254_740_992)));
        assert!(set.matches(&AttributeValue::Int(9_007_199_254_740_993)));
        assert!(AttributeValue::Int(i64::MAX).matches(&AttributeValue::Int(i64::MAX)));
    }

    #[test]
    fn test_is_finite() {
        assert!(AttributeValue::Int(1).is_finite());
        assert!(AttributeValue::Float(0.5).is_finite());
        assert!(!AttributeValue::Float(f64::NAN).is_finite());
        assert!(!AttributeValue::Float(f64::INFINITY).is_finite());
        assert!(AttributeValue::from("nan").is_finite());
    }

    #[test]
    fn test_text_never_matches_number() {
        assert!(!AttributeValue::from("9600").matches(&AttributeValue::Int(9600)));
        assert!(AttributeValue::from("ascii").matches(&AttributeValue::from("ascii")));
    }

    #[test]
    fn test_untagged_yaml() {
        let settings: Vec<AttributeSetting> = serde_yaml::from_str(
            "- { name: baud_rate, value: 9600 }\n- { name: chunk, value: 0.5 }\n- { name: enc, value: ascii }\n",
        )
        .unwrap();
        assert_eq!(settings[0].value, AttributeValue::Int(9600));
        assert_eq!(settings[1].value, AttributeValue::Float(0.5));
        assert_eq!(settings[2].value, AttributeValue::Text("ascii".into()));
    }
}
