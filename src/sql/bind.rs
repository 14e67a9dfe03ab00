//! Convert serde_json::Value to types the Any driver can bind, and rows back.

use serde_json::{Map, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row};

/// Bind every parameter in order. JSON numbers bind as i64 when integral,
/// arrays/objects bind as their JSON text.
pub fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for p in params {
        query = bind_value(query, p);
    }
    query
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Decode a row into a JSON object, column by column.
pub fn row_to_json(row: &AnyRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &AnyRow, name: &str) -> Value {
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(v) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(v);
    }
    Value::Null
}
