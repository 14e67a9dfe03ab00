//! Model schemas and the table descriptor derived from them.

use crate::error::SchemaError;
use crate::model::field::FieldDef;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Construction-time registry of a model's fields. Immutable once built.
#[derive(Debug)]
pub struct ModelSchema {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl ModelSchema {
    pub fn builder(name: &str, table: &str) -> SchemaBuilder {
        SchemaBuilder {
            name: name.to_string(),
            table: table.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identifier_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.identifier)
    }

    /// SQL-facing view: deduplicated alphabetical columns plus the identifier column.
    /// SQL storage requires exactly one identifier.
    pub fn table_descriptor(&self) -> Result<TableDescriptor, SchemaError> {
        let id = self
            .identifier_field()
            .ok_or_else(|| SchemaError::NoIdentifier {
                model: self.name.clone(),
            })?;
        let columns: BTreeSet<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        Ok(TableDescriptor {
            name: self.table.clone(),
            columns: columns.into_iter().collect(),
            id_column: id.name.clone(),
        })
    }
}

pub struct SchemaBuilder {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    pub fn build(self) -> Result<Arc<ModelSchema>, SchemaError> {
        let mut seen = BTreeSet::new();
        let mut id_seen = false;
        for f in &self.fields {
            if !seen.insert(f.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    model: self.name,
                    field: f.name.clone(),
                });
            }
            if f.identifier {
                if id_seen {
                    return Err(SchemaError::DuplicateIdentifier {
                        model: self.name,
                        field: f.name.clone(),
                    });
                }
                id_seen = true;
            }
        }
        Ok(Arc::new(ModelSchema {
            name: self.name,
            table: self.table,
            fields: self.fields,
        }))
    }
}

/// Ordered, deduplicated column view of a schema for statement builders.
#[derive(Clone, Debug)]
pub struct TableDescriptor {
    pub name: String,
    /// Alphabetical, including the identifier column.
    columns: Vec<String>,
    pub id_column: String,
}

impl TableDescriptor {
    pub fn new(name: &str, columns: &[&str], id_column: &str) -> Self {
        let cols: BTreeSet<String> = columns.iter().map(|c| c.to_string()).collect();
        TableDescriptor {
            name: name.to_string(),
            columns: cols.into_iter().collect(),
            id_column: id_column.to_string(),
        }
    }

    /// Column names in alphabetical order, optionally without the identifier.
    pub fn column_names(&self, with_id: bool) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| with_id || *c != self.id_column)
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Integer, Text};

    #[test]
    fn duplicate_identifier_rejected() {
        let err = ModelSchema::builder("vm", "vms")
            .field(FieldDef::uuid_identifier())
            .field(FieldDef::scalar("other", Text::default()).identifier())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateIdentifier { .. }));
    }

    #[test]
    fn duplicate_field_rejected() {
        let err = ModelSchema::builder("vm", "vms")
            .field(FieldDef::scalar("name", Text::default()))
            .field(FieldDef::scalar("name", Text::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn descriptor_orders_and_dedupes_columns() {
        let schema = ModelSchema::builder("vm", "vms")
            .field(FieldDef::scalar("name", Text::default()))
            .field(FieldDef::uuid_identifier())
            .field(FieldDef::scalar("cores", Integer::default()))
            .build()
            .unwrap();
        let table = schema.table_descriptor().unwrap();
        assert_eq!(table.column_names(true), vec!["cores", "name", "uuid"]);
        assert_eq!(table.column_names(false), vec!["cores", "name"]);
        assert_eq!(table.id_column, "uuid");
    }

    #[test]
    fn descriptor_requires_identifier() {
        let schema = ModelSchema::builder("vm", "vms")
            .field(FieldDef::scalar("name", Text::default()))
            .build()
            .unwrap();
        assert!(matches!(
            schema.table_descriptor(),
            Err(SchemaError::NoIdentifier { .. })
        ));
    }
}
