// Copyright 2023 Remi Bernotavicius

//! Copies ingredient names out of the capitalised `Ingredients` table that early versions of the
//! app wrote to, into `ingredients`.

use super::{resolve_ingredient, Seeder};
use crate::database;
use crate::{Error, Result};
use diesel::QueryableByName;
use diesel::RunQueryDsl as _;
use serde::Serialize;
use std::fmt;

pub const LEGACY_INGREDIENTS: &str = "Ingredients";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngredientMigrationReport {
    pub source_rows: usize,
    pub migrated: usize,
    pub already_present: usize,
    pub failed: usize,
}

impl fmt::Display for IngredientMigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} legacy ingredient(s): {} migrated, {} already present, {} failed",
            self.source_rows, self.migrated, self.already_present, self.failed
        )
    }
}

#[derive(QueryableByName)]
struct LegacyIngredient {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

/// Non-blank names from `table`, sorted.
pub fn legacy_ingredient_names(
    conn: &mut database::Connection,
    table: &str,
) -> Result<Vec<String>> {
    let rows = diesel::sql_query(format!(
        "SELECT name::text AS name FROM {} WHERE btrim(name::text) <> '' ORDER BY name",
        database::quote_identifier(table)
    ))
    .load::<LegacyIngredient>(conn)
    .map_err(|e| match e {
        diesel::result::Error::DatabaseError(_, ref info)
            if info.message().contains("does not exist") =>
        {
            Error::NotFound(format!("table {table:?}"))
        }
        e => Error::from(e),
    })?;
    Ok(rows.into_iter().map(|r| r.name).collect())
}

impl Seeder<'_> {
    /// Adds each name not already known case-insensitively. Every insert runs in its own savepoint,
    /// so one bad row is counted as failed and the rest still go in.
    pub fn migrate_ingredients(&mut self, names: &[String]) -> IngredientMigrationReport {
        let mut report = IngredientMigrationReport {
            source_rows: names.len(),
            ..Default::default()
        };
        for name in names {
            if self.ingredients.contains_key(&name.trim().to_lowercase()) {
                report.already_present += 1;
                continue;
            }
            match resolve_ingredient(self.conn, &mut self.ingredients, name, None) {
                Ok((id, true)) => {
                    log::info!("migrated {name:?} ({id})");
                    report.migrated += 1;
                }
                Ok((_, false)) => report.already_present += 1,
                Err(e) => {
                    log::error!("migrating {name:?} failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

pub fn migrate_legacy_ingredients(
    conn: &mut database::Connection,
    table: &str,
) -> Result<IngredientMigrationReport> {
    let names = legacy_ingredient_names(conn, table)?;
    log::info!("found {} ingredient(s) in {table:?}", names.len());
    Ok(Seeder::new(conn)?.migrate_ingredients(&names))
}

#[test]
fn migration_report_summary() {
    let report = IngredientMigrationReport {
        source_rows: 5,
        migrated: 3,
        already_present: 1,
        failed: 1,
    };
    assert_eq!(
        report.to_string(),
        "5 legacy ingredient(s): 3 migrated, 1 already present, 1 failed"
    );
}
