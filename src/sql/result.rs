//! Uniform execution result: affected-row count plus decoded rows.

use serde_json::{Map, Value};

/// What an executed statement produced. DML carries a count; SELECT carries
/// decoded rows (count equals the number fetched).
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    row_count: u64,
    rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn from_count(row_count: u64) -> Self {
        QueryResult {
            row_count,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        QueryResult {
            row_count: rows.len() as u64,
            rows,
        }
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn rows(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        self.rows
    }
}
