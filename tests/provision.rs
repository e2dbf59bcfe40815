// Copyright 2023 Remi Bernotavicius

mod common;

use diesel::connection::SimpleConnection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diy_recipes_admin::config::Config;
use diy_recipes_admin::database::{self, query, schema};
use diy_recipes_admin::provision::{self, ProvisionOutcome, TableStatus, REQUIRED_TABLES};
use diy_recipes_admin::seed::{self, legacy};

/// The shape tables had when the old import scripts created them, in a schema of their own so the
/// migrated tables in `public` are out of the way.
const LEGACY_TABLES: &str = r#"
    CREATE SCHEMA diy_legacy;
    SET LOCAL search_path TO diy_legacy, public;
    CREATE TABLE recipes (id UUID PRIMARY KEY, title TEXT NOT NULL);
    CREATE TABLE ingredients (id UUID PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE recipe_ingredients (
        id UUID PRIMARY KEY,
        recipe_id UUID NOT NULL REFERENCES recipes (id),
        ingredient_id UUID NOT NULL REFERENCES ingredients (id)
    );
    CREATE TABLE "Ingredients" (name TEXT);

    INSERT INTO recipes VALUES ('6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e', 'Beard Oil');
    INSERT INTO ingredients VALUES ('0b6a36a3-8f0e-4c55-9d1a-3b9c7f3c2e11', 'Jojoba Oil');
    INSERT INTO recipe_ingredients VALUES
        ('a0000000-0000-0000-0000-000000000001', '6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e', '0b6a36a3-8f0e-4c55-9d1a-3b9c7f3c2e11'),
        ('a0000000-0000-0000-0000-000000000002', '6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e', '0b6a36a3-8f0e-4c55-9d1a-3b9c7f3c2e11');
    INSERT INTO "Ingredients" VALUES ('jojoba oil'), ('Lavender Oil'), ('lavender oil'), ('Legacy Test Clay'), ('  ');
"#;

#[test]
fn migrated_database_has_every_required_table() {
    common::with_test_connection(|conn| {
        match provision::ensure_with_database(conn).unwrap() {
            ProvisionOutcome::Migrated { applied, tables } => {
                assert!(applied.is_empty(), "already applied on connect: {applied:?}");
                let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
                assert_eq!(names, REQUIRED_TABLES);
                for table in &tables {
                    assert!(table.status.exists(), "{}: {:?}", table.table, table.status);
                }
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    });
}

#[test]
fn ensure_schema_prefers_the_database_url() {
    let Ok(url) = std::env::var(common::TEST_DATABASE_URL) else {
        eprintln!("{} not set, skipping", common::TEST_DATABASE_URL);
        return;
    };
    let config = Config {
        database_url: Some(url),
        ..Default::default()
    };
    let outcome = provision::ensure_schema(&config).unwrap();
    assert!(matches!(outcome, ProvisionOutcome::Migrated { .. }));
    assert!(outcome.tables().iter().all(|t| t.status.exists()));
}

#[test]
fn reference_tools_and_library_entries_are_present() {
    common::with_test_connection(|conn| {
        let tools: Vec<String> = schema::tools::table
            .select(schema::tools::title)
            .order(schema::tools::title.asc())
            .load(conn)
            .unwrap();
        for title in ["Formulation Timer", "Scaling Calculator", "Unit Converter"] {
            assert!(tools.iter().any(|t| t == title), "{title} missing from {tools:?}");
        }
        let guide: i64 = schema::library::table
            .filter(schema::library::title.eq("Measurement Guide"))
            .count()
            .get_result(conn)
            .unwrap();
        assert_eq!(guide, 1);

        let tool_type: Option<String> = schema::tools::table
            .filter(schema::tools::title.eq("Formulation Timer"))
            .select(schema::tools::tool_type)
            .first(conn)
            .unwrap();
        assert_eq!(tool_type.as_deref(), Some("timer"));
    });
}

#[test]
fn legacy_tables_are_upgraded_and_seedable() {
    common::with_test_connection(|conn| {
        conn.batch_execute(LEGACY_TABLES).unwrap();

        match provision::database_table_status(conn, "recipe_ingredients").unwrap() {
            TableStatus::Incomplete { missing_columns } => {
                assert_eq!(missing_columns, ["quantity", "unit", "notes", "created_at"])
            }
            other => panic!("expected an incomplete table, got {other:?}"),
        }
        assert_eq!(
            database::table_status(conn, "Ingredients").unwrap(),
            TableStatus::Exists { rows: Some(5) }
        );

        conn.batch_execute(&provision::schema_sql()).unwrap();
        for table in REQUIRED_TABLES {
            let status = provision::database_table_status(conn, table).unwrap();
            assert!(status.exists(), "{table}: {status:?}");
        }
        let beard_oil = query::recipe_by_title(conn, "Beard Oil").unwrap().unwrap();
        assert_eq!(query::recipe_ingredients(conn, &beard_oil).unwrap().len(), 1);

        let migrated = legacy::migrate_legacy_ingredients(conn, legacy::LEGACY_INGREDIENTS).unwrap();
        assert_eq!(migrated.source_rows, 4);
        assert_eq!(migrated.migrated, 2);
        assert_eq!(migrated.already_present, 2);
        assert_eq!(migrated.failed, 0);
        assert!(query::ingredient_by_name(conn, "legacy test clay")
            .unwrap()
            .is_some());

        let report = seed::seed_catalog(conn, false).unwrap();
        assert_eq!(report.recipes_failed, 0, "{report}");
        assert!(report.recipes_reused >= 1);
        assert!(report.links_existing >= 1);
    });
}
