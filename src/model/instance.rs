//! Model instances: validated field values, dirty tracking, relationship references.

use crate::error::{AppError, SchemaError};
use crate::model::field::{FieldDef, FieldInit, FieldKind, RefValue};
use crate::model::schema::ModelSchema;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Slot {
    Scalar(Option<Value>),
    Ref(RefValue),
}

/// One entity: a validated aggregate of the schema's fields.
///
/// Constructed fresh with [`Model::new`] (defaults applied, required fields
/// enforced) or restored from a storage row with [`Model::restore`] (checks
/// bypassed, instance marked saved). The wire snapshot taken at construction
/// is the dirty-tracking baseline.
#[derive(Clone, Debug)]
pub struct Model {
    schema: Arc<ModelSchema>,
    slots: BTreeMap<String, Slot>,
    baseline: BTreeMap<String, Value>,
    saved: bool,
}

impl Model {
    pub fn new(
        schema: &Arc<ModelSchema>,
        mut init: BTreeMap<String, FieldInit>,
    ) -> Result<Model, AppError> {
        let mut slots = BTreeMap::new();
        for def in schema.fields() {
            let provided = init.remove(&def.name);
            let slot = match provided {
                Some(given) => Self::slot_from_init(schema, def, given)?,
                None => match &def.default {
                    Some(f) => Self::slot_from_init(schema, def, FieldInit::Value(f()))?,
                    None => Self::empty_slot(def),
                },
            };
            if def.required && Self::slot_is_empty(&slot) {
                return Err(AppError::Required(def.name.clone()));
            }
            slots.insert(def.name.clone(), slot);
        }
        if let Some(extra) = init.keys().next() {
            return Err(SchemaError::UnknownField {
                model: schema.name().to_string(),
                field: extra.clone(),
            }
            .into());
        }
        let mut model = Model {
            schema: schema.clone(),
            slots,
            baseline: BTreeMap::new(),
            saved: false,
        };
        model.baseline = model.wire_data()?;
        Ok(model)
    }

    /// Rebuild an instance from a storage row. Required and read-only checks
    /// are bypassed; relationship columns restore as unresolved keys.
    pub fn restore(schema: &Arc<ModelSchema>, row: &Map<String, Value>) -> Result<Model, AppError> {
        let mut slots = BTreeMap::new();
        for def in schema.fields() {
            let raw = row.get(&def.name).cloned().unwrap_or(Value::Null);
            let slot = match &def.kind {
                FieldKind::Scalar(ty) => {
                    if raw.is_null() {
                        Slot::Scalar(None)
                    } else {
                        let v = ty.from_wire(&raw).map_err(|e| AppError::TypeMismatch {
                            field: def.name.clone(),
                            value: e.value,
                            expected: e.expected,
                        })?;
                        Slot::Scalar(Some(v))
                    }
                }
                FieldKind::Relationship { .. } => {
                    if raw.is_null() {
                        Slot::Ref(RefValue::None)
                    } else {
                        Slot::Ref(RefValue::Key(raw))
                    }
                }
            };
            slots.insert(def.name.clone(), slot);
        }
        let mut model = Model {
            schema: schema.clone(),
            slots,
            baseline: BTreeMap::new(),
            saved: true,
        };
        model.baseline = model.wire_data()?;
        Ok(model)
    }

    fn slot_from_init(
        schema: &Arc<ModelSchema>,
        def: &FieldDef,
        given: FieldInit,
    ) -> Result<Slot, AppError> {
        match (&def.kind, given) {
            (FieldKind::Scalar(ty), FieldInit::Value(v)) => {
                if v.is_null() {
                    return Ok(Slot::Scalar(None));
                }
                if !ty.validate(&v) {
                    return Err(AppError::TypeMismatch {
                        field: def.name.clone(),
                        value: v,
                        expected: ty.name(),
                    });
                }
                Ok(Slot::Scalar(Some(v)))
            }
            (FieldKind::Scalar(_), FieldInit::Ref(_)) => Err(AppError::BadRequest(format!(
                "field '{}' of model '{}' is not a relationship",
                def.name,
                schema.name()
            ))),
            (FieldKind::Relationship { .. }, FieldInit::Value(v)) => {
                if v.is_null() {
                    Ok(Slot::Ref(RefValue::None))
                } else {
                    Ok(Slot::Ref(RefValue::Key(v)))
                }
            }
            (FieldKind::Relationship { allowed }, FieldInit::Ref(m)) => {
                if !allowed.iter().any(|a| a == m.schema().name()) {
                    return Err(AppError::BadRequest(format!(
                        "field '{}': model '{}' is not an allowed relationship target",
                        def.name,
                        m.schema().name()
                    )));
                }
                Ok(Slot::Ref(RefValue::Model(m)))
            }
        }
    }

    fn empty_slot(def: &FieldDef) -> Slot {
        match &def.kind {
            FieldKind::Scalar(_) => Slot::Scalar(None),
            FieldKind::Relationship { .. } => Slot::Ref(RefValue::None),
        }
    }

    fn slot_is_empty(slot: &Slot) -> bool {
        match slot {
            Slot::Scalar(v) => v.is_none(),
            Slot::Ref(r) => r.is_none(),
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Current scalar value, if set. Relationship fields answer through [`Model::reference`].
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.slots.get(name) {
            Some(Slot::Scalar(v)) => v.as_ref(),
            _ => None,
        }
    }

    pub fn reference(&self, name: &str) -> Option<&RefValue> {
        match self.slots.get(name) {
            Some(Slot::Ref(r)) => Some(r),
            _ => None,
        }
    }

    /// Set a field value. Rejects read-only fields, invalid values, and
    /// clearing a required field.
    pub fn set(&mut self, name: &str, value: impl Into<FieldInit>) -> Result<(), AppError> {
        let def = self
            .schema
            .field(name)
            .ok_or_else(|| SchemaError::UnknownField {
                model: self.schema.name().to_string(),
                field: name.to_string(),
            })?
            .clone();
        if def.read_only {
            return Err(AppError::ReadOnly(name.to_string()));
        }
        let slot = Self::slot_from_init(&self.schema, &def, value.into())?;
        if def.required && Self::slot_is_empty(&slot) {
            return Err(AppError::Required(name.to_string()));
        }
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }

    /// Apply a map of updates, e.g. an unpacked request body.
    pub fn apply(&mut self, values: BTreeMap<String, FieldInit>) -> Result<(), AppError> {
        for (name, v) in values {
            self.set(&name, v)?;
        }
        Ok(())
    }

    /// Wire form of every field, keyed by column name.
    pub fn wire_data(&self) -> Result<BTreeMap<String, Value>, AppError> {
        let mut out = BTreeMap::new();
        for def in self.schema.fields() {
            out.insert(def.name.clone(), self.wire_field(def)?);
        }
        Ok(out)
    }

    fn wire_field(&self, def: &FieldDef) -> Result<Value, AppError> {
        match (self.slots.get(&def.name), &def.kind) {
            (Some(Slot::Scalar(Some(v))), FieldKind::Scalar(ty)) => {
                ty.to_wire(v).map_err(|e| AppError::TypeMismatch {
                    field: def.name.clone(),
                    value: e.value,
                    expected: e.expected,
                })
            }
            (Some(Slot::Ref(r)), _) => Ok(r.wire()),
            _ => Ok(Value::Null),
        }
    }

    /// Wire form of the identifier column only.
    pub fn id_data(&self) -> Result<BTreeMap<String, Value>, AppError> {
        let def = self
            .schema
            .identifier_field()
            .ok_or_else(|| SchemaError::NoIdentifier {
                model: self.schema.name().to_string(),
            })?;
        let mut out = BTreeMap::new();
        out.insert(def.name.clone(), self.wire_field(def)?);
        Ok(out)
    }

    /// Wire form of every non-identifier column.
    pub fn data_fields(&self) -> Result<BTreeMap<String, Value>, AppError> {
        let mut out = self.wire_data()?;
        if let Some(def) = self.schema.identifier_field() {
            out.remove(&def.name);
        }
        Ok(out)
    }

    /// The identifier value in wire form, if set.
    pub fn identifier(&self) -> Option<Value> {
        let def = self.schema.identifier_field()?;
        match self.wire_field(def) {
            Ok(Value::Null) => None,
            Ok(v) => Some(v),
            Err(_) => None,
        }
    }

    /// Fields whose wire form differs from the baseline snapshot.
    pub fn dirty_fields(&self) -> Vec<String> {
        let Ok(current) = self.wire_data() else {
            return Vec::new();
        };
        current
            .into_iter()
            .filter(|(k, v)| self.baseline.get(k) != Some(v))
            .map(|(k, _)| k)
            .collect()
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Record a successful write: mark saved and rebase dirty tracking.
    pub fn mark_saved(&mut self) {
        self.saved = true;
        if let Ok(data) = self.wire_data() {
            self.baseline = data;
        }
    }

    /// Record a successful delete.
    pub fn mark_deleted(&mut self) {
        self.saved = false;
    }

    /// The single resolved parent of the given resource type, for locator
    /// traversal. Fails when none is resolved or more than one matches.
    pub fn parent_of_type(&self, resource: &str) -> Result<Arc<Model>, AppError> {
        let mut found: Vec<&Arc<Model>> = Vec::new();
        for def in self.schema.fields() {
            if let Some(Slot::Ref(RefValue::Model(m))) = self.slots.get(&def.name) {
                if m.schema().name() == resource {
                    found.push(m);
                }
            }
        }
        match found.len() {
            1 => Ok(found[0].clone()),
            0 => Err(AppError::NotFound(format!(
                "no resolved parent of type '{}' on model '{}'",
                resource,
                self.schema.name()
            ))),
            _ => Err(AppError::Conflict(format!(
                "several parents of type '{}' on model '{}'",
                resource,
                self.schema.name()
            ))),
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema().name() && self.identifier() == other.identifier()
    }
}
