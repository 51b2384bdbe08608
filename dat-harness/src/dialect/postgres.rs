//! PostgreSQL dialect implementation.

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn apply_default_case(&self, ident: &str) -> String {
        ident.to_lowercase()
    }

    fn select_json(&self, column: &str) -> String {
        format!("{}::text", self.quote_ident(column))
    }
}
