// Copyright 2023 Remi Bernotavicius

//! Version history for recipes. Each iteration freezes the recipe's ingredient lines at the time it
//! was recorded.

use crate::database;
use crate::database::models::{
    Ingredient, IterationId, IterationIngredient, NewIterationIngredient, NewRecipeIteration,
    RecipeId, RecipeIteration,
};
use crate::database::query;
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

#[derive(Debug, Clone, Default)]
pub struct NewIterationInput {
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

/// One past the highest recorded version. Gaps left by deleted iterations are not reused.
pub fn next_version(conn: &mut database::Connection, wanted: RecipeId) -> Result<i32> {
    use database::schema::recipe_iterations::dsl::*;
    use diesel::dsl::max;

    let current: Option<i32> = recipe_iterations
        .filter(recipe_id.eq(wanted))
        .select(max(version_number))
        .get_result(conn)?;
    Ok(current.unwrap_or(0) + 1)
}

/// Inserts the iteration row alone. Losing the race for its version number to another writer is
/// reported as [`Error::VersionConflict`].
pub fn insert_iteration(
    conn: &mut database::Connection,
    new_iteration: &NewRecipeIteration<'_>,
) -> Result<RecipeIteration> {
    diesel::insert_into(database::schema::recipe_iterations::table)
        .values(new_iteration)
        .returning(RecipeIteration::as_returning())
        .get_result(conn)
        .map_err(|e| match Error::from(e) {
            e if e.is_unique_violation() => Error::VersionConflict {
                recipe: new_iteration.recipe_id,
                version: new_iteration.version_number,
            },
            e => e,
        })
}

pub fn create_iteration(
    conn: &mut database::Connection,
    recipe: RecipeId,
    input: &NewIterationInput,
) -> Result<RecipeIteration> {
    conn.transaction::<_, Error, _>(|conn| {
        let recipe = query::recipe_by_id(conn, recipe)?;
        let version = next_version(conn, recipe.id)?;

        let new_iteration = NewRecipeIteration {
            recipe_id: recipe.id,
            version_number: version,
            title: input.title.trim(),
            description: input.description.as_deref(),
            notes: input.notes.as_deref(),
            metrics: input.metrics.as_ref(),
        };
        let iteration = insert_iteration(conn, &new_iteration)?;

        let lines = query::recipe_ingredients(conn, &recipe)?;
        let snapshot: Vec<NewIterationIngredient<'_>> = lines
            .iter()
            .map(|(line, _)| NewIterationIngredient {
                iteration_id: iteration.id,
                ingredient_id: line.ingredient_id,
                quantity: &line.quantity,
                unit: &line.unit,
                notes: line.notes.as_deref(),
            })
            .collect();
        if !snapshot.is_empty() {
            diesel::insert_into(database::schema::iteration_ingredients::table)
                .values(&snapshot)
                .execute(conn)?;
        }

        log::info!(
            "recorded version {version} of {:?} with {} ingredient(s)",
            recipe.title,
            snapshot.len()
        );
        Ok(iteration)
    })
}

/// Newest first.
pub fn list_iterations(
    conn: &mut database::Connection,
    wanted: RecipeId,
) -> Result<Vec<RecipeIteration>> {
    use database::schema::recipe_iterations::dsl::*;

    Ok(recipe_iterations
        .select(RecipeIteration::as_select())
        .filter(recipe_id.eq(wanted))
        .order(version_number.desc())
        .load(conn)?)
}

pub fn iteration_by_title(
    conn: &mut database::Connection,
    wanted_recipe: RecipeId,
    wanted_title: &str,
) -> Result<Option<RecipeIteration>> {
    use database::schema::recipe_iterations::dsl::*;

    Ok(recipe_iterations
        .select(RecipeIteration::as_select())
        .filter(recipe_id.eq(wanted_recipe))
        .filter(title.eq(wanted_title))
        .first(conn)
        .optional()?)
}

pub fn iteration_ingredients(
    conn: &mut database::Connection,
    wanted: IterationId,
) -> Result<Vec<(IterationIngredient, Ingredient)>> {
    use database::schema::ingredients::dsl::name;
    use database::schema::iteration_ingredients::dsl::*;

    Ok(iteration_ingredients
        .inner_join(database::schema::ingredients::table)
        .filter(iteration_id.eq(wanted))
        .select((IterationIngredient::as_select(), Ingredient::as_select()))
        .order(name.asc())
        .load(conn)?)
}
