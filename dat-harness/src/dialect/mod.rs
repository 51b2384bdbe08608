//! SQL dialect abstractions for the record stores.
//!
//! Each dialect is implemented in its own file. Dialects only quote and case identifiers
//! and say how to read the raw JSON column back as something parseable; the query shape
//! itself lives in [`crate::records`].

/// Maps identifiers and the raw data column to dialect-specific SQL fragments.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Case applied to identifiers the destination created without quoting.
    fn apply_default_case(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn qualify_table(&self, namespace: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(namespace), self.quote_ident(table))
    }

    /// Expression selecting a JSON column in a form the store can decode.
    fn select_json(&self, column: &str) -> String {
        self.quote_ident(column)
    }
}

mod duckdb;
pub use duckdb::DuckDbDialect;

mod postgres;
pub use postgres::PostgresDialect;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(DuckDbDialect.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn qualifies_with_namespace() {
        assert_eq!(
            DuckDbDialect.qualify_table("main", "_airbyte_raw_users"),
            "\"main\".\"_airbyte_raw_users\""
        );
    }

    #[test]
    fn postgres_lowercases_and_casts() {
        assert_eq!(PostgresDialect.apply_default_case("Users"), "users");
        assert_eq!(
            PostgresDialect.select_json("_airbyte_data"),
            "\"_airbyte_data\"::text"
        );
    }
}
