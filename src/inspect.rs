// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{Recipe, RecipeIteration};
use crate::database::query;
use crate::iterations;
use crate::provision::{self, TableStatus, REQUIRED_TABLES};
use crate::quantity::Quantity;
use crate::Result;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub required: bool,
    pub status: TableStatus,
}

/// Every public table with its row count, followed by any required table that is absent.
pub fn tables(conn: &mut database::Connection) -> Result<Vec<TableSummary>> {
    let present = database::list_public_tables(conn)?;
    let mut summaries: Vec<TableSummary> = present
        .iter()
        .map(|name| {
            let required = REQUIRED_TABLES.contains(&name.as_str());
            let status = if required {
                provision::database_table_status(conn, name)
            } else {
                database::table_status(conn, name)
            };
            TableSummary {
                name: name.clone(),
                required,
                status: status.unwrap_or_else(|e| TableStatus::Failed {
                    reason: e.to_string(),
                }),
            }
        })
        .collect();
    for required in REQUIRED_TABLES {
        if !present.iter().any(|p| p == required) {
            summaries.push(TableSummary {
                name: required.into(),
                required: true,
                status: TableStatus::Missing,
            });
        }
    }
    Ok(summaries)
}

pub fn render_tables(tables: &[TableSummary]) -> String {
    let width = tables.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for table in tables {
        let status = match &table.status {
            TableStatus::Exists { rows: Some(rows) } => format!("{rows} row(s)"),
            TableStatus::Exists { rows: None } => "present".into(),
            TableStatus::Incomplete { missing_columns } => {
                format!("INCOMPLETE (no {})", missing_columns.join(", "))
            }
            TableStatus::Missing => "MISSING".into(),
            TableStatus::Failed { reason } => format!("error: {reason}"),
        };
        let marker = if table.required { "*" } else { " " };
        out.push_str(&format!("{marker} {:width$}  {status}\n", table.name));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientLine {
    pub name: String,
    pub quantity: Quantity,
    pub notes: Option<String>,
}

impl fmt::Display for IngredientLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.name)?;
        if let Some(notes) = &self.notes {
            write!(f, " ({notes})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeView {
    pub recipe: Recipe,
    pub ingredients: Vec<IngredientLine>,
    pub iterations: Vec<RecipeIteration>,
}

pub fn recipe_view(conn: &mut database::Connection, key: &str) -> Result<RecipeView> {
    let recipe = query::find_recipe(conn, key)?;
    let ingredients = query::recipe_ingredients(conn, &recipe)?
        .into_iter()
        .map(|(line, ingredient)| IngredientLine {
            name: ingredient.name,
            quantity: line.measure(),
            notes: line.notes,
        })
        .collect();
    let iterations = iterations::list_iterations(conn, recipe.id)?;
    Ok(RecipeView {
        recipe,
        ingredients,
        iterations,
    })
}

impl fmt::Display for RecipeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.recipe.title, self.recipe.id)?;
        if let Some(description) = &self.recipe.description {
            writeln!(f, "{description}")?;
        }
        writeln!(f)?;
        if self.ingredients.is_empty() {
            writeln!(f, "no ingredients")?;
        }
        for line in &self.ingredients {
            writeln!(f, "  - {line}")?;
        }
        if let Some(instructions) = &self.recipe.instructions {
            writeln!(f, "\n{instructions}")?;
        }
        if !self.iterations.is_empty() {
            writeln!(f, "\nversions:")?;
            for iteration in &self.iterations {
                writeln!(
                    f,
                    "  v{} {} ({})",
                    iteration.version_number,
                    iteration.title,
                    iteration.created_at.format("%Y-%m-%d")
                )?;
            }
        }
        Ok(())
    }
}

#[test]
fn ingredient_lines_use_canonical_quantities() {
    let line = IngredientLine {
        name: "Jojoba Oil".into(),
        quantity: Quantity::new("40", "%"),
        notes: Some("12 g".into()),
    };
    assert_eq!(line.to_string(), "40% Jojoba Oil (12 g)");

    let line = IngredientLine {
        name: "Green Tea".into(),
        quantity: Quantity::new("2", "bags"),
        notes: None,
    };
    assert_eq!(line.to_string(), "2 bags Green Tea");
}

#[test]
fn table_listing_marks_required_and_missing() {
    let rendered = render_tables(&[
        TableSummary {
            name: "recipes".into(),
            required: true,
            status: TableStatus::Exists { rows: Some(6) },
        },
        TableSummary {
            name: "notes".into(),
            required: false,
            status: TableStatus::Exists { rows: Some(0) },
        },
        TableSummary {
            name: "user_preferences".into(),
            required: true,
            status: TableStatus::Missing,
        },
    ]);
    assert_eq!(
        rendered,
        "* recipes           6 row(s)\n  notes             0 row(s)\n* user_preferences  MISSING\n"
    );
}

#[test]
fn table_listing_names_missing_columns() {
    let rendered = render_tables(&[TableSummary {
        name: "recipe_ingredients".into(),
        required: true,
        status: TableStatus::Incomplete {
            missing_columns: vec!["notes".into(), "created_at".into()],
        },
    }]);
    assert_eq!(
        rendered,
        "* recipe_ingredients  INCOMPLETE (no notes, created_at)\n"
    );
}
