// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    Ingredient, IngredientId, NewIngredient, NewRecipe, NewRecipeIngredient, Recipe,
    RecipeIngredient, RecipeId,
};
use crate::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use chrono::{DateTime, Utc};
use diesel::SelectableHelper as _;
use std::cmp::Reverse;
use std::collections::HashMap;

diesel::define_sql_function! {
    fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

pub fn all_recipes(conn: &mut database::Connection) -> Result<Vec<Recipe>> {
    use database::schema::recipes::dsl::*;

    Ok(recipes
        .select(Recipe::as_select())
        .order((created_at.desc(), id.asc()))
        .load(conn)?)
}

pub fn recipe_by_id(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .select(Recipe::as_select())
        .filter(id.eq(recipe_id))
        .get_result(conn)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("recipe {recipe_id}")))
}

/// Orders recipes sharing a title, best first: one with ingredients beats one without, then the
/// newest wins, then the id decides.
pub fn survivor_rank(
    ingredient_count: i64,
    created_at: DateTime<Utc>,
    id: RecipeId,
) -> (Reverse<bool>, Reverse<DateTime<Utc>>, RecipeId) {
    (Reverse(ingredient_count > 0), Reverse(created_at), id)
}

/// Of the recipes with exactly this title, the one duplicate cleanup would keep.
pub fn recipe_by_title(conn: &mut database::Connection, wanted: &str) -> Result<Option<Recipe>> {
    use database::schema::recipes::dsl::*;

    let matching: Vec<Recipe> = recipes
        .select(Recipe::as_select())
        .filter(title.eq(wanted))
        .load(conn)?;
    if matching.len() < 2 {
        return Ok(matching.into_iter().next());
    }
    let counts = ingredient_counts(conn)?;
    Ok(matching.into_iter().min_by_key(|recipe| {
        survivor_rank(
            counts.get(&recipe.id).copied().unwrap_or(0),
            recipe.created_at,
            recipe.id,
        )
    }))
}

/// Accepts either a recipe id or a title, the way operators refer to recipes on the command line.
pub fn find_recipe(conn: &mut database::Connection, key: &str) -> Result<Recipe> {
    if let Ok(recipe_id) = key.parse::<RecipeId>() {
        return recipe_by_id(conn, recipe_id);
    }
    recipe_by_title(conn, key.trim())?.ok_or_else(|| Error::NotFound(format!("recipe {key:?}")))
}

pub fn add_recipe(conn: &mut database::Connection, new_recipe: &NewRecipe<'_>) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;
    use diesel::insert_into;

    Ok(insert_into(recipes)
        .values(new_recipe)
        .returning(Recipe::as_returning())
        .get_result(conn)?)
}

/// Removes a recipe along with its ingredient rows. Iterations go with it through the cascade.
pub fn delete_recipe(conn: &mut database::Connection, delete_id: RecipeId) -> Result<usize> {
    use database::schema::{recipe_ingredients, recipes};
    use diesel::delete;

    delete(recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(delete_id)))
        .execute(conn)?;
    Ok(delete(recipes::table.filter(recipes::id.eq(delete_id))).execute(conn)?)
}

pub fn recipe_ingredients(
    conn: &mut database::Connection,
    recipe: &Recipe,
) -> Result<Vec<(RecipeIngredient, Ingredient)>> {
    use database::schema::ingredients::dsl::name;

    Ok(RecipeIngredient::belonging_to(recipe)
        .inner_join(database::schema::ingredients::table)
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .order(name.asc())
        .load(conn)?)
}

pub fn ingredient_counts(conn: &mut database::Connection) -> Result<HashMap<RecipeId, i64>> {
    use database::schema::recipe_ingredients::dsl::*;
    use diesel::dsl::count_star;

    let rows: Vec<(RecipeId, i64)> = recipe_ingredients
        .group_by(recipe_id)
        .select((recipe_id, count_star()))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub fn all_ingredients(conn: &mut database::Connection) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .order(name.asc())
        .load(conn)?)
}

pub fn ingredient_by_name(
    conn: &mut database::Connection,
    wanted: &str,
) -> Result<Option<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(lower(name).eq(wanted.trim().to_lowercase()))
        .first(conn)
        .optional()?)
}

pub fn add_ingredient(
    conn: &mut database::Connection,
    new_ingredient: &NewIngredient<'_>,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;
    use diesel::insert_into;

    Ok(insert_into(ingredients)
        .values(new_ingredient)
        .returning(Ingredient::as_returning())
        .get_result(conn)?)
}

/// Links an ingredient to a recipe. Returns `false` when the pair was already linked, in which case
/// the existing row is left as it was.
pub fn add_recipe_ingredient(
    conn: &mut database::Connection,
    link: &NewRecipeIngredient<'_>,
) -> Result<bool> {
    use database::schema::recipe_ingredients::dsl::*;
    use diesel::insert_into;

    let inserted = insert_into(recipe_ingredients)
        .values(link)
        .on_conflict((recipe_id, ingredient_id))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn count_links(
    conn: &mut database::Connection,
    wanted_recipe: RecipeId,
    wanted_ingredient: IngredientId,
) -> Result<i64> {
    use database::schema::recipe_ingredients::dsl::*;

    Ok(recipe_ingredients
        .filter(recipe_id.eq(wanted_recipe))
        .filter(ingredient_id.eq(wanted_ingredient))
        .count()
        .get_result(conn)?)
}
