// Copyright 2023 Remi Bernotavicius

//! Making sure the tables the app needs exist.
//!
//! With a direct database URL the embedded migrations are authoritative. With only REST
//! credentials the same SQL is pushed through the `exec_sql` function, and when that function is
//! absent too the SQL is handed back for an operator to paste into the hosted SQL console.

use crate::config::Config;
use crate::database;
use crate::postgrest::PostgrestClient;
use crate::{Error, Result};
use serde::Serialize;

pub const REQUIRED_TABLES: [&str; 8] = [
    "recipes",
    "ingredients",
    "recipe_ingredients",
    "recipe_iterations",
    "iteration_ingredients",
    "user_preferences",
    "tools",
    "library",
];

/// The columns the app reads from each required table. Tables created by older scripts can exist
/// without some of them.
pub fn required_columns(table: &str) -> &'static [&'static str] {
    match table {
        "recipes" => &[
            "id",
            "title",
            "description",
            "instructions",
            "user_id",
            "created_at",
            "updated_at",
        ],
        "ingredients" => &["id", "name", "description", "created_at"],
        "recipe_ingredients" => &[
            "id",
            "recipe_id",
            "ingredient_id",
            "quantity",
            "unit",
            "notes",
            "created_at",
        ],
        "recipe_iterations" => &[
            "id",
            "recipe_id",
            "version_number",
            "title",
            "description",
            "notes",
            "metrics",
            "created_at",
        ],
        "iteration_ingredients" => &[
            "id",
            "iteration_id",
            "ingredient_id",
            "quantity",
            "unit",
            "notes",
        ],
        "user_preferences" => &[
            "user_id",
            "theme",
            "audio_enabled",
            "volume",
            "display_name",
            "updated_at",
        ],
        "tools" => &["id", "title", "description", "type", "created_at"],
        "library" => &["id", "title", "description", "content", "category", "created_at"],
        _ => &[],
    }
}

pub const EXEC_SQL: &str = "exec_sql";

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_FUNCTION: &str = "42883";
const POSTGREST_NO_TABLE: &str = "PGRST205";
const POSTGREST_NO_FUNCTION: &str = "PGRST202";

const MIGRATION_SQL: [(&str, &str); 7] = [
    (
        "diesel_initial_setup",
        include_str!("../migrations/00000000000000_diesel_initial_setup/up.sql"),
    ),
    (
        "create_recipes",
        include_str!("../migrations/2024-05-01-000001_create_recipes/up.sql"),
    ),
    (
        "create_recipe_iterations",
        include_str!("../migrations/2024-05-01-000002_create_recipe_iterations/up.sql"),
    ),
    (
        "create_user_preferences",
        include_str!("../migrations/2024-05-01-000003_create_user_preferences/up.sql"),
    ),
    (
        "create_exec_sql_function",
        include_str!("../migrations/2024-05-01-000004_create_exec_sql_function/up.sql"),
    ),
    (
        "upgrade_legacy_tables",
        include_str!("../migrations/2024-05-01-000005_upgrade_legacy_tables/up.sql"),
    ),
    (
        "create_tools_and_library",
        include_str!("../migrations/2024-05-01-000006_create_tools_and_library/up.sql"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Exists { rows: Option<u64> },
    /// The table is there but lacks columns the app reads.
    Incomplete { missing_columns: Vec<String> },
    Missing,
    Failed { reason: String },
}

impl TableStatus {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn exists(&self) -> bool {
        matches!(self, Self::Exists { .. })
    }

    /// Missing and incomplete tables are both fixed by running the schema SQL.
    pub fn needs_schema(&self) -> bool {
        matches!(self, Self::Missing | Self::Incomplete { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcStatus {
    Available,
    Missing,
    Failed { reason: String },
}

/// Decides what a failed probe means. Only an undefined relation counts as missing; everything
/// else is surfaced as a failure.
pub fn classify_probe_failure(code: Option<&str>, message: &str) -> TableStatus {
    let missing = matches!(code, Some(UNDEFINED_TABLE | POSTGREST_NO_TABLE))
        || message.contains("does not exist");
    if missing {
        TableStatus::Missing
    } else {
        TableStatus::Failed {
            reason: message.to_owned(),
        }
    }
}

pub fn classify_rpc_failure(code: Option<&str>, message: &str) -> RpcStatus {
    let missing = matches!(code, Some(UNDEFINED_FUNCTION | POSTGREST_NO_FUNCTION))
        || message.contains("does not exist")
        || message.contains("Could not find the function");
    if missing {
        RpcStatus::Missing
    } else {
        RpcStatus::Failed {
            reason: message.to_owned(),
        }
    }
}

/// Names that end up in REST URL paths. Only plain lower-case identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = name.len() <= 63
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_owned()))
    }
}

/// Every migration's `up.sql`, in order. All of it is safe to run against a partially
/// provisioned database.
pub fn schema_sql() -> String {
    let mut sql = String::new();
    for (name, body) in MIGRATION_SQL {
        sql.push_str(&format!("-- {name}\n"));
        sql.push_str(body.trim());
        sql.push_str("\n\n");
    }
    sql
}

/// The required columns of `table` that are not in `present`.
pub fn missing_columns(table: &str, present: &[String]) -> Vec<String> {
    required_columns(table)
        .iter()
        .filter(|&&column| !present.iter().any(|p| p == column))
        .map(|&column| column.to_owned())
        .collect()
}

fn with_columns(status: TableStatus, missing_columns: Vec<String>) -> TableStatus {
    if missing_columns.is_empty() {
        status
    } else {
        TableStatus::Incomplete { missing_columns }
    }
}

/// Counts rows and then compares the table's columns against [`required_columns`].
pub fn database_table_status(conn: &mut database::Connection, table: &str) -> Result<TableStatus> {
    let status = database::table_status(conn, table)?;
    if !status.exists() {
        return Ok(status);
    }
    let present = database::column_names(conn, table)?;
    Ok(with_columns(status, missing_columns(table, &present)))
}

/// The REST counterpart of [`database_table_status`].
pub fn rest_table_status(client: &PostgrestClient, table: &str) -> Result<TableStatus> {
    let status = client.probe_table(table)?;
    if !status.exists() {
        return Ok(status);
    }
    let missing = client.missing_columns(table, required_columns(table))?;
    Ok(with_columns(status, missing))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub status: TableStatus,
}

pub fn probe_tables(
    tables: &[&str],
    mut probe: impl FnMut(&str) -> Result<TableStatus>,
) -> Vec<TableReport> {
    tables
        .iter()
        .map(|&table| {
            let status = probe(table).unwrap_or_else(|e| {
                log::warn!("probing {table} failed: {e}");
                TableStatus::Failed {
                    reason: e.to_string(),
                }
            });
            TableReport {
                table: table.to_owned(),
                status,
            }
        })
        .collect()
}

fn tables_needing_schema(tables: &[TableReport]) -> Vec<String> {
    tables
        .iter()
        .filter(|t| t.status.needs_schema())
        .map(|t| t.table.clone())
        .collect()
}

/// Of the tables that needed the schema SQL, the ones that are usable now.
fn now_usable(needed: Vec<String>, after: &[TableReport]) -> Vec<String> {
    needed
        .into_iter()
        .filter(|table| {
            after
                .iter()
                .any(|report| &report.table == table && report.status.exists())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// Migrations ran over a direct connection.
    Migrated {
        applied: Vec<String>,
        tables: Vec<TableReport>,
    },
    AlreadyProvisioned {
        tables: Vec<TableReport>,
    },
    /// The schema SQL went through the `exec_sql` function.
    ProvisionedViaRpc {
        provisioned: Vec<String>,
        tables: Vec<TableReport>,
    },
    /// Nothing could create or complete the tables; `sql` has to be run by hand.
    ManualSqlRequired {
        missing: Vec<String>,
        sql: String,
    },
}

impl ProvisionOutcome {
    pub fn tables(&self) -> &[TableReport] {
        match self {
            Self::Migrated { tables, .. }
            | Self::AlreadyProvisioned { tables }
            | Self::ProvisionedViaRpc { tables, .. } => tables,
            Self::ManualSqlRequired { .. } => &[],
        }
    }
}

pub fn ensure_with_database(conn: &mut database::Connection) -> Result<ProvisionOutcome> {
    let applied = database::run_pending_migrations(conn)?;
    for version in &applied {
        log::info!("applied migration {version}");
    }
    let tables = probe_tables(&REQUIRED_TABLES, |t| database_table_status(conn, t));
    Ok(ProvisionOutcome::Migrated { applied, tables })
}

pub fn ensure_with_rest(client: &PostgrestClient) -> Result<ProvisionOutcome> {
    let tables = probe_tables(&REQUIRED_TABLES, |t| rest_table_status(client, t));
    let needed = tables_needing_schema(&tables);
    if needed.is_empty() {
        return Ok(ProvisionOutcome::AlreadyProvisioned { tables });
    }
    log::info!("missing or incomplete tables: {}", needed.join(", "));

    let sql = schema_sql();
    match client.rpc(EXEC_SQL, &serde_json::json!({ "sql": sql })) {
        Ok(_) => {
            let tables = probe_tables(&REQUIRED_TABLES, |t| rest_table_status(client, t));
            let provisioned = now_usable(needed, &tables);
            Ok(ProvisionOutcome::ProvisionedViaRpc {
                provisioned,
                tables,
            })
        }
        Err(Error::Api(e)) => match classify_rpc_failure(e.code.as_deref(), &e.to_string()) {
            RpcStatus::Missing => {
                log::warn!("{EXEC_SQL} is not installed; the schema has to be created by hand");
                Ok(ProvisionOutcome::ManualSqlRequired {
                    missing: needed,
                    sql,
                })
            }
            _ => Err(Error::Api(e)),
        },
        Err(e) => Err(e),
    }
}

/// Prefers migrations over a direct connection and falls back to the REST surface.
pub fn ensure_schema(config: &Config) -> Result<ProvisionOutcome> {
    if let Some(url) = config.database_url.as_deref() {
        let mut conn = database::connect(url)?;
        return ensure_with_database(&mut conn);
    }
    log::info!("no database URL configured, provisioning over REST");
    let client = PostgrestClient::new(config.require_supabase_url()?, config.admin_key()?)?;
    ensure_with_rest(&client)
}

#[test]
fn missing_relation_is_recognised_by_code_or_message() {
    assert_eq!(
        classify_probe_failure(Some("42P01"), "whatever"),
        TableStatus::Missing
    );
    assert_eq!(
        classify_probe_failure(
            Some("PGRST205"),
            "Could not find the table 'public.tools' in the schema cache"
        ),
        TableStatus::Missing
    );
    assert_eq!(
        classify_probe_failure(None, "relation \"recipe_iterations\" does not exist"),
        TableStatus::Missing
    );
}

#[test]
fn other_failures_are_not_mistaken_for_presence() {
    let status = classify_probe_failure(Some("42501"), "permission denied for table recipes");
    assert_eq!(
        status,
        TableStatus::Failed {
            reason: "permission denied for table recipes".into()
        }
    );
    assert!(!status.exists());
    assert!(!status.is_missing());

    assert!(matches!(
        classify_probe_failure(None, "Invalid API key"),
        TableStatus::Failed { .. }
    ));
}

#[test]
fn rpc_failures() {
    assert_eq!(
        classify_rpc_failure(Some("PGRST202"), "Could not find the function public.exec_sql"),
        RpcStatus::Missing
    );
    assert_eq!(
        classify_rpc_failure(None, "function \"execute_sql\" does not exist"),
        RpcStatus::Missing
    );
    assert!(matches!(
        classify_rpc_failure(Some("42501"), "permission denied for function exec_sql"),
        RpcStatus::Failed { .. }
    ));
}

#[test]
fn identifiers() {
    for good in REQUIRED_TABLES {
        validate_identifier(good).unwrap();
    }
    validate_identifier("_private").unwrap();
    for bad in ["", "Recipes", "recipes;drop", "1abc", "recipes ingredients", "rpc/exec"] {
        assert!(validate_identifier(bad).is_err(), "{bad:?} accepted");
    }
}

#[test]
fn schema_sql_covers_every_required_table() {
    let sql = schema_sql();
    for table in REQUIRED_TABLES {
        assert!(
            sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
            "{table} missing from schema sql"
        );
    }
    assert!(sql.contains("FUNCTION public.exec_sql(sql text)"));
    let recipes = sql.find("-- create_recipes").unwrap();
    let iterations = sql.find("-- create_recipe_iterations").unwrap();
    assert!(recipes < iterations);
}

#[test]
fn schema_sql_upgrades_legacy_tables() {
    let sql = schema_sql();
    assert!(sql.contains("ALTER TABLE recipes ADD COLUMN IF NOT EXISTS instructions TEXT;"));
    assert!(sql.contains("ALTER TABLE recipe_ingredients ADD COLUMN IF NOT EXISTS notes TEXT;"));
    assert!(sql.contains("ON recipe_ingredients (recipe_id, ingredient_id)"));
    let create = sql.find("-- create_recipes").unwrap();
    let upgrade = sql.find("-- upgrade_legacy_tables").unwrap();
    assert!(create < upgrade);
}

#[test]
fn required_columns_are_compared_by_name() {
    let legacy: Vec<String> = ["id", "title", "description", "created_at", "updated_at", "user_id"]
        .map(String::from)
        .to_vec();
    assert_eq!(missing_columns("recipes", &legacy), ["instructions"]);

    let full: Vec<String> = required_columns("tools").iter().map(|c| c.to_string()).collect();
    assert!(missing_columns("tools", &full).is_empty());
    assert!(missing_columns("Ingredients", &[]).is_empty());
    for table in REQUIRED_TABLES {
        assert!(!required_columns(table).is_empty(), "{table} has no required columns");
    }

    assert_eq!(
        with_columns(TableStatus::Exists { rows: Some(3) }, vec!["notes".into()]),
        TableStatus::Incomplete {
            missing_columns: vec!["notes".into()]
        }
    );
    assert!(TableStatus::Incomplete {
        missing_columns: vec![]
    }
    .needs_schema());
    assert!(!TableStatus::Failed {
        reason: "permission denied".into()
    }
    .needs_schema());
}

#[test]
fn provisioned_tables_are_only_those_now_usable() {
    let after = vec![
        TableReport {
            table: "tools".into(),
            status: TableStatus::Exists { rows: Some(3) },
        },
        TableReport {
            table: "library".into(),
            status: TableStatus::Missing,
        },
        TableReport {
            table: "recipes".into(),
            status: TableStatus::Incomplete {
                missing_columns: vec!["instructions".into()],
            },
        },
    ];
    assert_eq!(
        now_usable(vec!["tools".into(), "library".into(), "recipes".into()], &after),
        ["tools"]
    );
}

#[cfg(test)]
fn mock_complete_table<'a>(
    server: &'a httpmock::MockServer,
    table: &str,
) -> Vec<httpmock::Mock<'a>> {
    let path = format!("/rest/v1/{table}");
    vec![
        server.mock(|when, then| {
            when.path(path.clone()).query_param("select", "*");
            then.status(200).header("Content-Range", "*/0").body("[]");
        }),
        server.mock(|when, then| {
            when.path(path.clone())
                .query_param("select", required_columns(table).join(","));
            then.status(200).body("[]");
        }),
    ]
}

#[test]
fn rest_provisioning_falls_back_to_manual_sql() {
    use httpmock::Method::POST;
    use httpmock::MockServer;

    let server = MockServer::start();
    let _recipes = mock_complete_table(&server, "recipes");
    let _missing: Vec<_> = REQUIRED_TABLES[1..]
        .iter()
        .map(|table| {
            server.mock(|when, then| {
                when.path(format!("/rest/v1/{table}"));
                then.status(404)
                    .body(r#"{"code":"42P01","message":"relation does not exist"}"#);
            })
        })
        .collect();
    let exec_sql = server.mock(|when, then| {
        when.method(POST).path("/rest/v1/rpc/exec_sql");
        then.status(404).body(
            r#"{"code":"PGRST202","message":"Could not find the function public.exec_sql(sql)"}"#,
        );
    });
    let client = PostgrestClient::new(&server.base_url(), "service").unwrap();

    match ensure_with_rest(&client).unwrap() {
        ProvisionOutcome::ManualSqlRequired { missing, sql } => {
            assert_eq!(missing.len(), REQUIRED_TABLES.len() - 1);
            assert!(!missing.contains(&"recipes".to_owned()));
            assert_eq!(sql, schema_sql());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    exec_sql.assert_hits(1);
}

#[test]
fn rest_status_finds_incomplete_legacy_table() {
    use httpmock::MockServer;

    let server = MockServer::start();
    let undefined_column =
        r#"{"code":"42703","message":"column recipe_ingredients.notes does not exist"}"#;
    let _all = server.mock(|when, then| {
        when.path("/rest/v1/recipe_ingredients").query_param("select", "*");
        then.status(200).header("Content-Range", "0-0/4").body("[{}]");
    });
    let _together = server.mock(|when, then| {
        when.path("/rest/v1/recipe_ingredients")
            .query_param("select", required_columns("recipe_ingredients").join(","));
        then.status(400).body(undefined_column);
    });
    let _each: Vec<_> = required_columns("recipe_ingredients")
        .iter()
        .map(|&column| {
            server.mock(|when, then| {
                when.path("/rest/v1/recipe_ingredients")
                    .query_param("select", column);
                if column == "notes" {
                    then.status(400).body(undefined_column);
                } else {
                    then.status(200).body("[]");
                }
            })
        })
        .collect();
    let client = PostgrestClient::new(&server.base_url(), "service").unwrap();

    assert_eq!(
        rest_table_status(&client, "recipe_ingredients").unwrap(),
        TableStatus::Incomplete {
            missing_columns: vec!["notes".into()]
        }
    );
}

#[test]
fn rest_provisioning_reports_tables_still_missing_after_exec_sql() {
    use httpmock::Method::POST;
    use httpmock::MockServer;

    let server = MockServer::start();
    let _complete: Vec<_> = REQUIRED_TABLES[..7]
        .iter()
        .flat_map(|table| mock_complete_table(&server, table))
        .collect();
    let _library = server.mock(|when, then| {
        when.path("/rest/v1/library");
        then.status(404).body(
            r#"{"code":"PGRST205","message":"Could not find the table 'public.library' in the schema cache"}"#,
        );
    });
    let exec_sql = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/rpc/exec_sql")
            .body_contains("CREATE TABLE IF NOT EXISTS library");
        then.status(204);
    });
    let client = PostgrestClient::new(&server.base_url(), "service").unwrap();

    match ensure_with_rest(&client).unwrap() {
        ProvisionOutcome::ProvisionedViaRpc {
            provisioned,
            tables,
        } => {
            assert!(provisioned.is_empty());
            let library = tables.iter().find(|t| t.table == "library").unwrap();
            assert!(library.status.is_missing());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    exec_sql.assert_hits(1);
}
