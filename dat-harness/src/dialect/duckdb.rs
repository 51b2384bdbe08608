//! DuckDB dialect implementation.

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn select_json(&self, column: &str) -> String {
        // JSON and VARCHAR columns both come back as text
        format!("CAST({} AS VARCHAR)", self.quote_ident(column))
    }
}
