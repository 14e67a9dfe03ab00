//! Persistence operations on model instances and schema-level queries.
//!
//! Every operation takes an optional session. With `Some`, it runs inside
//! the caller's unit of work and the caller commits. With `None`, it opens
//! its own session, commits on success and rolls back on failure.

use crate::error::AppError;
use crate::filters::Filter;
use crate::model::{FieldKind, Model, ModelSchema};
use crate::storage::engine::Engine;
use crate::storage::session::Session;
use std::collections::BTreeMap;
use std::sync::Arc;

impl Model {
    /// Persist a fresh instance as a new row.
    pub async fn insert(
        &mut self,
        engine: &Engine,
        session: Option<&mut Session>,
    ) -> Result<(), AppError> {
        match session {
            Some(s) => self.insert_in(engine, s).await,
            None => {
                let mut s = engine.session().await?;
                match self.insert_in(engine, &mut s).await {
                    Ok(()) => s.commit().await,
                    Err(e) => {
                        let _ = s.rollback().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn insert_in(&mut self, engine: &Engine, session: &mut Session) -> Result<(), AppError> {
        let table = self.schema().table_descriptor()?;
        let stmt = engine.dialect().insert(&table, &self.wire_data()?)?;
        session.execute(&stmt.sql, &stmt.params).await?;
        self.mark_saved();
        Ok(())
    }

    /// Rewrite the row identified by this instance. Exactly one row must
    /// match: zero rows is a missing record, more than one is corruption.
    pub async fn update(
        &mut self,
        engine: &Engine,
        session: Option<&mut Session>,
    ) -> Result<(), AppError> {
        match session {
            Some(s) => self.update_in(engine, s).await,
            None => {
                let mut s = engine.session().await?;
                match self.update_in(engine, &mut s).await {
                    Ok(()) => s.commit().await,
                    Err(e) => {
                        let _ = s.rollback().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn update_in(&mut self, engine: &Engine, session: &mut Session) -> Result<(), AppError> {
        let table = self.schema().table_descriptor()?;
        let stmt = engine
            .dialect()
            .update(&table, &self.id_data()?, &self.data_fields()?)?;
        let result = session.execute(&stmt.sql, &stmt.params).await?;
        match result.row_count() {
            1 => {
                self.mark_saved();
                Ok(())
            }
            0 => Err(AppError::NotFound(format!(
                "no row in '{}' for this identifier",
                table.name
            ))),
            n => Err(AppError::MultipleRows {
                table: table.name,
                affected: n,
            }),
        }
    }

    /// Insert when never saved, otherwise update when anything changed.
    pub async fn save(
        &mut self,
        engine: &Engine,
        session: Option<&mut Session>,
    ) -> Result<(), AppError> {
        if !self.is_saved() {
            self.insert(engine, session).await
        } else if !self.dirty_fields().is_empty() {
            self.update(engine, session).await
        } else {
            Ok(())
        }
    }

    /// Delete the row identified by this instance.
    pub async fn delete(
        &mut self,
        engine: &Engine,
        session: Option<&mut Session>,
    ) -> Result<(), AppError> {
        match session {
            Some(s) => self.delete_in(engine, s).await,
            None => {
                let mut s = engine.session().await?;
                match self.delete_in(engine, &mut s).await {
                    Ok(()) => s.commit().await,
                    Err(e) => {
                        let _ = s.rollback().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn delete_in(&mut self, engine: &Engine, session: &mut Session) -> Result<(), AppError> {
        let table = self.schema().table_descriptor()?;
        let stmt = engine.dialect().delete(&table, &self.id_data()?)?;
        session.execute(&stmt.sql, &stmt.params).await?;
        self.mark_deleted();
        Ok(())
    }
}

/// Query entry point for one schema, in the shape controllers consume.
#[derive(Clone)]
pub struct Objects {
    schema: Arc<ModelSchema>,
}

impl Objects {
    pub fn new(schema: Arc<ModelSchema>) -> Objects {
        Objects { schema }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Every instance matching the filters, restored from rows.
    pub async fn get_all(
        &self,
        engine: &Engine,
        session: Option<&mut Session>,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<Vec<Model>, AppError> {
        match session {
            Some(s) => self.get_all_in(engine, s, filters).await,
            None => {
                let mut s = engine.session().await?;
                match self.get_all_in(engine, &mut s, filters).await {
                    Ok(v) => {
                        s.commit().await?;
                        Ok(v)
                    }
                    Err(e) => {
                        let _ = s.rollback().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn get_all_in(
        &self,
        engine: &Engine,
        session: &mut Session,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<Vec<Model>, AppError> {
        let table = self.schema.table_descriptor()?;
        let wired = self.wire_filters(filters)?;
        let stmt = engine.dialect().select(&table, &wired)?;
        let result = session.query(&stmt.sql, &stmt.params).await?;
        result
            .into_rows()
            .iter()
            .map(|row| Model::restore(&self.schema, row))
            .collect()
    }

    /// The single instance matching the filters. Zero matches is a missing
    /// record, several matches is a conflict.
    pub async fn get_one(
        &self,
        engine: &Engine,
        session: Option<&mut Session>,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<Model, AppError> {
        let mut found = self.get_all(engine, session, filters).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(AppError::NotFound(format!(
                "no '{}' matches the given filters",
                self.schema.name()
            ))),
            n => Err(AppError::Conflict(format!(
                "{} instances of '{}' match, expected one",
                n,
                self.schema.name()
            ))),
        }
    }

    /// Convert filter values to wire form through the field types, so query
    /// parameters compare against what the columns store.
    fn wire_filters(
        &self,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<BTreeMap<String, Filter>, AppError> {
        let mut out = BTreeMap::new();
        for (name, filter) in filters {
            let wired = match self.schema.field(name).map(|f| &f.kind) {
                Some(FieldKind::Scalar(ty)) if !filter.value().is_null() => {
                    let v = ty
                        .from_wire(filter.value())
                        .and_then(|v| ty.to_wire(&v))
                        .map_err(|e| AppError::TypeMismatch {
                            field: name.clone(),
                            value: e.value,
                            expected: e.expected,
                        })?;
                    filter.with_value(v)
                }
                _ => filter.clone(),
            };
            out.insert(name.clone(), wired);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDef;
    use crate::types::{Text, UuidType};
    use serde_json::json;

    fn vm_objects() -> Objects {
        let schema = ModelSchema::builder("vm", "vms")
            .field(FieldDef::uuid_identifier())
            .field(FieldDef::scalar("name", Text::default()).required())
            .field(FieldDef::scalar("owner", UuidType))
            .build()
            .unwrap();
        Objects::new(schema)
    }

    #[test]
    fn filters_normalize_through_field_types() {
        let objects = vm_objects();
        let mut filters = BTreeMap::new();
        filters.insert(
            "owner".to_string(),
            Filter::Eq(json!("2D0CD532-B77A-45F9-AE11-E56EB1E8F22B")),
        );
        let wired = objects.wire_filters(&filters).unwrap();
        assert_eq!(
            wired["owner"].value(),
            &json!("2d0cd532-b77a-45f9-ae11-e56eb1e8f22b")
        );
    }

    #[test]
    fn invalid_filter_value_rejected() {
        let objects = vm_objects();
        let mut filters = BTreeMap::new();
        filters.insert("owner".to_string(), Filter::Eq(json!("not-a-uuid")));
        let err = objects.wire_filters(&filters).unwrap_err();
        assert!(matches!(err, AppError::TypeMismatch { field, .. } if field == "owner"));
    }
}
