// Copyright 2023 Remi Bernotavicius

use crate::provision::{self, TableStatus};
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::QueryableByName;
use diesel::RunQueryDsl as _;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub mod models;
pub mod query;
pub mod schema;

pub type Connection = diesel::pg::PgConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Connects and brings the schema up to date. Every command that touches rows goes through here, so
/// a fresh project is provisioned on first use.
pub fn establish_connection(url: &str) -> Result<Connection> {
    let mut connection = Connection::establish(url)?;
    let applied = run_pending_migrations(&mut connection)?;
    if !applied.is_empty() {
        log::info!("applied {} migration(s): {}", applied.len(), applied.join(", "));
    }
    Ok(connection)
}

/// Connects without touching the schema.
pub fn connect(url: &str) -> Result<Connection> {
    Ok(Connection::establish(url)?)
}

pub fn run_pending_migrations(conn: &mut Connection) -> Result<Vec<String>> {
    let versions = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Migration(e.to_string()))?;
    Ok(versions.into_iter().map(|v| v.to_string()).collect())
}

#[derive(QueryableByName)]
struct RowCount {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

/// Double-quotes a table name so mixed-case names like the legacy `Ingredients` resolve as written.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Runs `SELECT count(*)` against `table` and classifies the outcome.
///
/// A missing relation leaves the connection usable, but inside a transaction Postgres aborts the
/// transaction, so callers probing several tables should do it outside one.
pub fn table_status(conn: &mut Connection, table: &str) -> Result<TableStatus> {
    let result = diesel::sql_query(format!(
        "SELECT count(*) AS count FROM {}",
        quote_identifier(table)
    ))
    .get_result::<RowCount>(conn);
    Ok(match result {
        Ok(row) => TableStatus::Exists {
            rows: u64::try_from(row.count).ok(),
        },
        Err(diesel::result::Error::DatabaseError(_, info)) => {
            provision::classify_probe_failure(None, info.message())
        }
        Err(e) => TableStatus::Failed {
            reason: e.to_string(),
        },
    })
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    table_name: String,
}

/// Tables in the current schema, which is `public` unless `search_path` says otherwise.
pub fn list_public_tables(conn: &mut Connection) -> Result<Vec<String>> {
    let rows = diesel::sql_query(
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         AND table_name NOT LIKE '\\_\\_diesel%' \
         ORDER BY table_name",
    )
    .load::<TableName>(conn)?;
    Ok(rows.into_iter().map(|r| r.table_name).collect())
}

#[derive(QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    column_name: String,
}

pub fn column_names(conn: &mut Connection, table: &str) -> Result<Vec<String>> {
    let rows = diesel::sql_query(
        "SELECT column_name::text AS column_name FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind::<diesel::sql_types::Text, _>(table)
    .load::<ColumnName>(conn)?;
    Ok(rows.into_iter().map(|r| r.column_name).collect())
}

#[test]
fn identifiers_are_quoted_verbatim() {
    assert_eq!(quote_identifier("recipes"), "\"recipes\"");
    assert_eq!(quote_identifier("Ingredients"), "\"Ingredients\"");
    assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
}
