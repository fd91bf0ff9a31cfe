use super::{ConnectOptions, Postgres};
use crate::error::{Error, Result};

impl Postgres {
    fn options_for(database: Option<&str>) -> ConnectOptions {
        ConnectOptions {
            database: database.map(str::to_string),
            ..Default::default()
        }
    }

    /// User tables of `database` (the primary one if `None`).
    pub async fn tables(&self, database: Option<&str>) -> Result<Vec<String>> {
        let client = self.connect(Self::options_for(database)).await?;
        let rows = client
            .query(
                "SELECT tablename::text FROM pg_catalog.pg_tables \
                 WHERE schemaname != 'information_schema' AND schemaname != 'pg_catalog' \
                 ORDER BY tablename",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    pub async fn table_exists(&self, database: Option<&str>, schema: &str, table: &str) -> Result<bool> {
        let client = self.connect(Self::options_for(database)).await?;
        let row = client
            .query_one(
                "SELECT count(*) FROM pg_catalog.pg_tables WHERE schemaname = $1 AND tablename = $2",
                &[&schema, &table],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(count == 1)
    }

    /// Column names of `schema.table` in declaration order.
    pub async fn table_columns(&self, database: Option<&str>, schema: &str, table: &str) -> Result<Vec<String>> {
        let client = self.connect(Self::options_for(database)).await?;
        let rows = client
            .query(
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    /// Check that `table` (optionally `schema.table`, `public` otherwise)
    /// exists and has every column in `expected`.
    pub async fn validate_table(&self, database: Option<&str>, table: &str, expected: &[&str]) -> Result<()> {
        let (schema, table) = split_table_name(table);

        if !self.table_exists(database, &schema, &table).await? {
            return Err(Error::Validation(format!(
                "table {}.{} does not exist",
                schema, table
            )));
        }

        let columns = self.table_columns(database, &schema, &table).await?;
        for column in expected {
            if !columns.iter().any(|c| c == column) {
                return Err(Error::Validation(format!(
                    "column {} does not exist in table: {}.{}{{{}}}",
                    column,
                    schema,
                    table,
                    columns.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn split_table_name(name: &str) -> (String, String) {
    let unquote = |s: &str| s.trim_matches('"').to_string();
    match name.split_once('.') {
        Some((schema, table)) => (unquote(schema), unquote(table)),
        None => ("public".to_string(), unquote(name)),
    }
}
