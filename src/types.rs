//! Field type contract: validation plus wire conversion for property values.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const UUID_PATTERN: &str = "[a-f0-9]{8}-([a-f0-9]{4}-){3}[a-f0-9]{12}";

/// A value rejected by a field type. The model layer attaches the field name.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub value: Value,
    pub expected: &'static str,
}

/// Validation and wire conversion for one kind of property value.
/// Wire form is a JSON primitive; `from_wire(to_wire(v)) == v` must hold for
/// every value the type accepts.
pub trait FieldType: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, value: &Value) -> bool;

    fn to_wire(&self, value: &Value) -> Result<Value, TypeError> {
        self.checked(value)
    }

    fn from_wire(&self, raw: &Value) -> Result<Value, TypeError> {
        self.checked(raw)
    }

    fn checked(&self, value: &Value) -> Result<Value, TypeError> {
        if self.validate(value) {
            Ok(value.clone())
        } else {
            Err(TypeError {
                value: value.clone(),
                expected: self.name(),
            })
        }
    }
}

/// Bounded-length string.
pub struct Text {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for Text {
    fn default() -> Self {
        Text {
            min_length: 0,
            max_length: 255,
        }
    }
}

impl FieldType for Text {
    fn name(&self) -> &'static str {
        "text"
    }

    fn validate(&self, value: &Value) -> bool {
        match value.as_str() {
            Some(s) => s.len() >= self.min_length && s.len() <= self.max_length,
            None => false,
        }
    }
}

/// Bounded integer.
pub struct Integer {
    pub min_value: i64,
    pub max_value: i64,
}

impl Default for Integer {
    fn default() -> Self {
        Integer {
            min_value: 0,
            max_value: 65535,
        }
    }
}

impl FieldType for Integer {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn validate(&self, value: &Value) -> bool {
        match value.as_i64() {
            Some(n) => n >= self.min_value && n <= self.max_value,
            None => false,
        }
    }
}

pub struct Boolean;

impl FieldType for Boolean {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn validate(&self, value: &Value) -> bool {
        value.is_boolean()
    }
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{}$", UUID_PATTERN)).unwrap())
}

/// Hyphenated lowercase UUID string.
pub struct UuidType;

impl FieldType for UuidType {
    fn name(&self) -> &'static str {
        "uuid"
    }

    fn validate(&self, value: &Value) -> bool {
        value.as_str().map(|s| uuid_re().is_match(s)).unwrap_or(false)
    }

    fn from_wire(&self, raw: &Value) -> Result<Value, TypeError> {
        // Storage drivers may hand back uppercase or braced forms.
        if let Some(s) = raw.as_str() {
            if let Ok(u) = uuid::Uuid::parse_str(s) {
                return Ok(Value::String(u.to_string()));
            }
        }
        Err(TypeError {
            value: raw.clone(),
            expected: self.name(),
        })
    }
}

/// Colon-separated MAC address.
pub struct Mac;

impl FieldType for Mac {
    fn name(&self) -> &'static str {
        "mac"
    }

    fn validate(&self, value: &Value) -> bool {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new("^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$").unwrap()
        });
        value.as_str().map(|s| re.is_match(s)).unwrap_or(false)
    }
}

/// One of a declared set of string values.
pub struct Enum {
    allowed: Vec<String>,
}

impl Enum {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Self {
        Enum {
            allowed: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl FieldType for Enum {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn validate(&self, value: &Value) -> bool {
        value
            .as_str()
            .map(|s| self.allowed.iter().any(|a| a == s))
            .unwrap_or(false)
    }
}

/// RFC 3339 timestamp, normalized to UTC on restore.
pub struct DateTime;

impl FieldType for DateTime {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn validate(&self, value: &Value) -> bool {
        value
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false)
    }

    fn from_wire(&self, raw: &Value) -> Result<Value, TypeError> {
        if let Some(s) = raw.as_str() {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Ok(Value::String(dt.with_timezone(&chrono::Utc).to_rfc3339()));
            }
        }
        Err(TypeError {
            value: raw.clone(),
            expected: self.name(),
        })
    }
}

/// Resource URI: literal segments ending in a UUID identifier.
pub struct Uri;

impl FieldType for Uri {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn validate(&self, value: &Value) -> bool {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(&format!("^(/[A-Za-z0-9\\-_]*)*/{}$", UUID_PATTERN)).unwrap()
        });
        value.as_str().map(|s| re.is_match(s)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(ty: &dyn FieldType, v: Value) {
        let wire = ty.to_wire(&v).unwrap();
        assert_eq!(ty.from_wire(&wire).unwrap(), v);
    }

    #[test]
    fn text_bounds() {
        let ty = Text::default();
        assert!(ty.validate(&json!("hello")));
        assert!(!ty.validate(&json!(5)));
        assert!(!ty.validate(&json!("x".repeat(256))));
        round_trip(&ty, json!("hello"));
    }

    #[test]
    fn integer_bounds() {
        let ty = Integer::default();
        assert!(ty.validate(&json!(0)));
        assert!(ty.validate(&json!(65535)));
        assert!(!ty.validate(&json!(-1)));
        assert!(!ty.validate(&json!("5")));
        round_trip(&ty, json!(42));
    }

    #[test]
    fn uuid_accepts_lowercase_hyphenated_only() {
        let ty = UuidType;
        assert!(ty.validate(&json!("2d0cd532-b77a-45f9-ae11-e56eb1e8f22b")));
        assert!(!ty.validate(&json!("2D0CD532-B77A-45F9-AE11-E56EB1E8F22B")));
        assert!(!ty.validate(&json!("not-a-uuid")));
        round_trip(&ty, json!("2d0cd532-b77a-45f9-ae11-e56eb1e8f22b"));
    }

    #[test]
    fn uuid_from_wire_normalizes_case() {
        let out = UuidType
            .from_wire(&json!("2D0CD532-B77A-45F9-AE11-E56EB1E8F22B"))
            .unwrap();
        assert_eq!(out, json!("2d0cd532-b77a-45f9-ae11-e56eb1e8f22b"));
    }

    #[test]
    fn mac_format() {
        let ty = Mac;
        assert!(ty.validate(&json!("00:1a:2b:3c:4d:5e")));
        assert!(ty.validate(&json!("00:1A:2B:3C:4D:5E")));
        assert!(!ty.validate(&json!("001a2b3c4d5e")));
        round_trip(&ty, json!("00:1a:2b:3c:4d:5e"));
    }

    #[test]
    fn enum_membership() {
        let ty = Enum::new(["on", "off"]);
        assert!(ty.validate(&json!("on")));
        assert!(!ty.validate(&json!("standby")));
        round_trip(&ty, json!("off"));
    }

    #[test]
    fn datetime_normalizes_offset_to_utc() {
        let ty = DateTime;
        assert!(ty.validate(&json!("2026-08-25T10:00:00+00:00")));
        assert!(!ty.validate(&json!("2026-08-25")));
        let out = ty.from_wire(&json!("2026-08-25T12:00:00+02:00")).unwrap();
        assert_eq!(out, json!("2026-08-25T10:00:00+00:00"));
    }

    #[test]
    fn uri_shape() {
        let ty = Uri;
        assert!(ty.validate(&json!("/vms/2d0cd532-b77a-45f9-ae11-e56eb1e8f22b")));
        assert!(!ty.validate(&json!("/vms/")));
        assert!(!ty.validate(&json!("vms/2d0cd532-b77a-45f9-ae11-e56eb1e8f22b")));
        round_trip(&ty, json!("/vms/2d0cd532-b77a-45f9-ae11-e56eb1e8f22b"));
    }

    #[test]
    fn checked_reports_expected_type() {
        let err = Integer::default().to_wire(&json!("nope")).unwrap_err();
        assert_eq!(err.expected, "integer");
    }
}
