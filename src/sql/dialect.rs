//! Builds parameterized INSERT, UPDATE, DELETE, SELECT for one SQL syntax.
//!
//! The statement algebra is shared: columns render in alphabetical order so
//! statement text is deterministic regardless of declaration order. Dialects
//! supply only quoting and placeholder syntax.

use crate::error::{AppError, SchemaError};
use crate::filters::Filter;
use crate::model::TableDescriptor;
use serde_json::Value;
use std::collections::BTreeMap;

/// A rendered statement plus its positional parameters, in placeholder order.
#[derive(Clone, Debug)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub trait Dialect: Send + Sync {
    fn quote(&self, ident: &str) -> String;

    /// Positional placeholder for the n-th parameter (1-based).
    fn placeholder(&self, n: usize) -> String;

    /// `INSERT INTO t (cols...) VALUES (...)` over every column, alphabetical.
    fn insert(
        &self,
        table: &TableDescriptor,
        data: &BTreeMap<String, Value>,
    ) -> Result<Statement, AppError> {
        let columns = table.column_names(true);
        let mut params = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::with_capacity(columns.len());
        for (n, col) in columns.iter().enumerate() {
            params.push(column_value(table, data, col)?);
            placeholders.push(self.placeholder(n + 1));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(&table.name),
            columns
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        Ok(Statement { sql, params })
    }

    /// `UPDATE t SET ... WHERE id`: SET over non-identifier columns
    /// (alphabetical), WHERE over identifier columns (alphabetical); the
    /// parameter tuple is SET values followed by WHERE values.
    fn update(
        &self,
        table: &TableDescriptor,
        ids: &BTreeMap<String, Value>,
        data: &BTreeMap<String, Value>,
    ) -> Result<Statement, AppError> {
        let set_cols = table.column_names(false);
        let mut params = Vec::with_capacity(set_cols.len() + 1);
        let mut n = 0;
        let mut sets = Vec::with_capacity(set_cols.len());
        for col in &set_cols {
            params.push(column_value(table, data, col)?);
            n += 1;
            sets.push(format!("{} = {}", self.quote(col), self.placeholder(n)));
        }
        params.push(column_value(table, ids, &table.id_column)?);
        n += 1;
        let where_clause = format!(
            "{} = {}",
            self.quote(&table.id_column),
            self.placeholder(n)
        );
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote(&table.name),
            sets.join(", "),
            where_clause
        );
        Ok(Statement { sql, params })
    }

    /// `DELETE FROM t WHERE id`.
    fn delete(
        &self,
        table: &TableDescriptor,
        ids: &BTreeMap<String, Value>,
    ) -> Result<Statement, AppError> {
        let params = vec![column_value(table, ids, &table.id_column)?];
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(&table.name),
            self.quote(&table.id_column),
            self.placeholder(1)
        );
        Ok(Statement { sql, params })
    }

    /// `SELECT cols FROM t [WHERE f1 AND f2 ...]`: projection over every
    /// column (alphabetical), conjunction over the filters (alphabetical).
    /// Fails before execution when a filter names an unknown column.
    fn select(
        &self,
        table: &TableDescriptor,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<Statement, AppError> {
        for col in filters.keys() {
            if !table.has_column(col) {
                return Err(SchemaError::UnknownField {
                    model: table.name.clone(),
                    field: col.clone(),
                }
                .into());
            }
        }
        let columns = table.column_names(true);
        let mut params = Vec::with_capacity(filters.len());
        let mut predicates = Vec::with_capacity(filters.len());
        for (n, (col, filter)) in filters.iter().enumerate() {
            params.push(filter.value().clone());
            predicates.push(format!(
                "{} {} {}",
                self.quote(col),
                filter.operator(),
                self.placeholder(n + 1)
            ));
        }
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            self.quote(&table.name)
        );
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        Ok(Statement { sql, params })
    }
}

fn column_value(
    table: &TableDescriptor,
    data: &BTreeMap<String, Value>,
    col: &str,
) -> Result<Value, AppError> {
    data.get(col).cloned().ok_or_else(|| {
        AppError::BadRequest(format!("no value for column '{}' of '{}'", col, table.name))
    })
}

/// Backtick quoting, driver-native `?` placeholders.
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }
}

/// Double-quote quoting, `$n` placeholders.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TableDescriptor {
        TableDescriptor::new("t", &["b", "a", "uuid"], "uuid")
    }

    fn data(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn insert_orders_columns_alphabetically() {
        let stmt = MySqlDialect
            .insert(
                &table(),
                &data(&[("b", json!(2)), ("a", json!(1)), ("uuid", json!("u"))]),
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `t` (`a`, `b`, `uuid`) VALUES (?, ?, ?)"
        );
        assert_eq!(stmt.params, vec![json!(1), json!(2), json!("u")]);
    }

    #[test]
    fn update_set_precedes_where_identifier() {
        let stmt = MySqlDialect
            .update(
                &table(),
                &data(&[("uuid", json!("u"))]),
                &data(&[("b", json!(2)), ("a", json!(1))]),
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE `t` SET `a` = ?, `b` = ? WHERE `uuid` = ?"
        );
        assert_eq!(stmt.params, vec![json!(1), json!(2), json!("u")]);
    }

    #[test]
    fn delete_filters_on_identifier_only() {
        let stmt = MySqlDialect
            .delete(&table(), &data(&[("uuid", json!("u"))]))
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `t` WHERE `uuid` = ?");
        assert_eq!(stmt.params, vec![json!("u")]);
    }

    #[test]
    fn select_without_filters_has_no_where() {
        let stmt = MySqlDialect.select(&table(), &BTreeMap::new()).unwrap();
        assert_eq!(stmt.sql, "SELECT `a`, `b`, `uuid` FROM `t`");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn select_renders_filter_operators_alphabetically() {
        let mut filters = BTreeMap::new();
        filters.insert("b".to_string(), Filter::Gt(json!(5)));
        filters.insert("a".to_string(), Filter::Eq(json!("x")));
        let stmt = MySqlDialect.select(&table(), &filters).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `a`, `b`, `uuid` FROM `t` WHERE `a` = ? AND `b` > ?"
        );
        assert_eq!(stmt.params, vec![json!("x"), json!(5)]);
    }

    #[test]
    fn select_rejects_unknown_filter_column() {
        let mut filters = BTreeMap::new();
        filters.insert("name".to_string(), Filter::Eq(json!("x")));
        let err = MySqlDialect.select(&table(), &filters).unwrap_err();
        assert!(matches!(
            err,
            AppError::Schema(SchemaError::UnknownField { field, .. }) if field == "name"
        ));
    }

    #[test]
    fn postgres_uses_numbered_placeholders_and_double_quotes() {
        let stmt = PostgresDialect
            .update(
                &table(),
                &data(&[("uuid", json!("u"))]),
                &data(&[("a", json!(1)), ("b", json!(2))]),
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"t\" SET \"a\" = $1, \"b\" = $2 WHERE \"uuid\" = $3"
        );
    }
}
