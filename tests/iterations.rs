// Copyright 2023 Remi Bernotavicius

mod common;

use diesel::prelude::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diy_recipes_admin::database::models::{
    NewIngredient, NewRecipe, NewRecipeIngredient, NewRecipeIteration, RecipeId,
};
use diy_recipes_admin::database::{query, schema, Connection};
use diy_recipes_admin::iterations::{self, NewIterationInput};
use diy_recipes_admin::Error;

fn recipe_with_ingredient(conn: &mut Connection) -> RecipeId {
    let recipe = query::add_recipe(
        conn,
        &NewRecipe {
            title: "Iteration Test Balm",
            description: None,
            instructions: None,
        },
    )
    .unwrap();
    let ingredient = query::add_ingredient(
        conn,
        &NewIngredient {
            name: "Iteration Test Wax",
            description: None,
        },
    )
    .unwrap();
    query::add_recipe_ingredient(
        conn,
        &NewRecipeIngredient {
            recipe_id: recipe.id,
            ingredient_id: ingredient.id,
            quantity: "30",
            unit: "%",
            notes: Some("9 g"),
        },
    )
    .unwrap();
    recipe.id
}

fn input(title: &str) -> NewIterationInput {
    NewIterationInput {
        title: title.into(),
        metrics: Some(serde_json::json!({ "hold": 7 })),
        ..Default::default()
    }
}

#[test]
fn versions_increase_and_snapshot_ingredients() {
    common::with_test_connection(|conn| {
        let recipe = recipe_with_ingredient(conn);

        let first = iterations::create_iteration(conn, recipe, &input("first")).unwrap();
        let second = iterations::create_iteration(conn, recipe, &input("second")).unwrap();
        assert_eq!(first.version_number, 1);
        assert_eq!(second.version_number, 2);
        assert_eq!(second.metrics, Some(serde_json::json!({ "hold": 7 })));

        let snapshot = iterations::iteration_ingredients(conn, first.id).unwrap();
        assert_eq!(snapshot.len(), 1);
        let (line, ingredient) = &snapshot[0];
        assert_eq!(ingredient.name, "Iteration Test Wax");
        assert_eq!((line.quantity.as_str(), line.unit.as_str()), ("30", "%"));
        assert_eq!(line.notes.as_deref(), Some("9 g"));

        let listed: Vec<i32> = iterations::list_iterations(conn, recipe)
            .unwrap()
            .iter()
            .map(|i| i.version_number)
            .collect();
        assert_eq!(listed, [2, 1]);
    });
}

#[test]
fn deleted_versions_are_not_reused() {
    common::with_test_connection(|conn| {
        let recipe = recipe_with_ingredient(conn);
        for title in ["a", "b", "c"] {
            iterations::create_iteration(conn, recipe, &input(title)).unwrap();
        }
        {
            use schema::recipe_iterations::dsl::*;
            diesel::delete(recipe_iterations.filter(recipe_id.eq(recipe)).filter(version_number.eq(2)))
                .execute(conn)
                .unwrap();
        }
        let next = iterations::create_iteration(conn, recipe, &input("d")).unwrap();
        assert_eq!(next.version_number, 4);
    });
}

#[test]
fn unknown_recipe_is_not_found() {
    common::with_test_connection(|conn| {
        let missing: RecipeId = "00000000-0000-0000-0000-000000000404".parse().unwrap();
        assert!(matches!(
            iterations::create_iteration(conn, missing, &input("x")),
            Err(Error::NotFound(_))
        ));
    });
}

#[test]
fn taken_version_number_is_a_conflict() {
    common::with_test_connection(|conn| {
        let recipe = recipe_with_ingredient(conn);
        iterations::create_iteration(conn, recipe, &input("first")).unwrap();

        let racing = NewRecipeIteration {
            recipe_id: recipe,
            version_number: 1,
            title: "written by another session",
            description: None,
            notes: None,
            metrics: None,
        };
        let result = conn.transaction(|conn| iterations::insert_iteration(conn, &racing));
        match result {
            Err(Error::VersionConflict { recipe: r, version }) => {
                assert_eq!(r, recipe);
                assert_eq!(version, 1);
            }
            other => panic!("expected a version conflict, got {other:?}"),
        }

        let next = iterations::create_iteration(conn, recipe, &input("second")).unwrap();
        assert_eq!(next.version_number, 2);
    });
}
