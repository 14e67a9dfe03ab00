//! Field declarations: static metadata plus the value forms a field can hold.

use crate::types::FieldType;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// What a field holds: a typed scalar or a reference to another model.
#[derive(Clone)]
pub enum FieldKind {
    Scalar(Arc<dyn FieldType>),
    /// Reference to another model instance; target schema must be one of `allowed`.
    Relationship { allowed: Vec<String> },
}

/// Declared metadata for one model field.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    pub identifier: bool,
    pub default: Option<DefaultFn>,
}

impl FieldDef {
    pub fn scalar(name: &str, field_type: impl FieldType + 'static) -> Self {
        FieldDef {
            name: name.to_string(),
            kind: FieldKind::Scalar(Arc::new(field_type)),
            required: false,
            read_only: false,
            identifier: false,
            default: None,
        }
    }

    pub fn relationship<I, S>(name: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldDef {
            name: name.to_string(),
            kind: FieldKind::Relationship {
                allowed: allowed.into_iter().map(Into::into).collect(),
            },
            required: false,
            read_only: false,
            identifier: false,
            default: None,
        }
    }

    /// Read-only UUID identifier field with a generated default.
    pub fn uuid_identifier() -> Self {
        FieldDef::scalar("uuid", crate::types::UuidType)
            .read_only()
            .identifier()
            .with_default(|| Value::String(uuid::Uuid::new_v4().to_string()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub fn with_default(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("read_only", &self.read_only)
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Runtime value of a relationship field.
#[derive(Clone, Debug, Default)]
pub enum RefValue {
    #[default]
    None,
    /// Foreign-key identifier restored from storage; parent not yet resolved.
    Key(Value),
    /// Resolved parent instance.
    Model(Arc<super::Model>),
}

impl RefValue {
    /// Wire form: the referenced identifier, or Null.
    pub fn wire(&self) -> Value {
        match self {
            RefValue::None => Value::Null,
            RefValue::Key(v) => v.clone(),
            RefValue::Model(m) => m.identifier().unwrap_or(Value::Null),
        }
    }

    pub fn as_model(&self) -> Option<&Arc<super::Model>> {
        match self {
            RefValue::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RefValue::None)
    }
}

/// A value supplied at model construction: either a scalar or a resolved reference.
#[derive(Clone, Debug)]
pub enum FieldInit {
    Value(Value),
    Ref(Arc<super::Model>),
}

impl From<Value> for FieldInit {
    fn from(v: Value) -> Self {
        FieldInit::Value(v)
    }
}

impl From<Arc<super::Model>> for FieldInit {
    fn from(m: Arc<super::Model>) -> Self {
        FieldInit::Ref(m)
    }
}
