// Copyright 2023 Remi Bernotavicius

mod common;

use diesel::PgTextExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diy_recipes_admin::database::query;
use diy_recipes_admin::database::schema::ingredients;
use diy_recipes_admin::iterations;
use diy_recipes_admin::database::models::NewIngredient;
use diy_recipes_admin::seed::catalog::{CatalogIngredient, CatalogRecipe};
use diy_recipes_admin::seed::{self, catalog, SeedReport, Seeder};
use std::collections::HashMap;

#[test]
fn seeding_twice_changes_nothing() {
    common::with_test_connection(|conn| {
        let first = seed::seed_catalog(conn, false).unwrap();
        assert_eq!(first.recipes_failed, 0);
        assert_eq!(
            first.recipes_created + first.recipes_reused,
            catalog::recipes().len()
        );

        let second = seed::seed_catalog(conn, false).unwrap();
        assert_eq!(second.recipes_created, 0);
        assert_eq!(second.recipes_reused, catalog::recipes().len());
        assert_eq!(second.ingredients_created, 0);
        assert_eq!(second.links_created, 0);
        let lines: usize = catalog::recipes().iter().map(|r| r.ingredients.len()).sum();
        assert_eq!(second.links_existing, lines);
    });
}

#[test]
fn jojoba_oil_is_stored_once_with_both_measures() {
    common::with_test_connection(|conn| {
        seed::seed_catalog(conn, false).unwrap();
        seed::seed_catalog(conn, false).unwrap();

        let jojoba_rows: i64 = ingredients::table
            .filter(ingredients::name.ilike("jojoba oil"))
            .count()
            .get_result(conn)
            .unwrap();
        assert_eq!(jojoba_rows, 1);

        let beard_oil = query::recipe_by_title(conn, "Beard Oil").unwrap().unwrap();
        let jojoba = query::ingredient_by_name(conn, "Jojoba Oil").unwrap().unwrap();
        assert_eq!(query::count_links(conn, beard_oil.id, jojoba.id).unwrap(), 1);

        let lines = query::recipe_ingredients(conn, &beard_oil).unwrap();
        let (line, _) = lines
            .iter()
            .find(|(_, ingredient)| ingredient.id == jojoba.id)
            .unwrap();
        assert_eq!(line.quantity, "40");
        assert_eq!(line.unit, "%");
        assert_eq!(line.notes.as_deref(), Some("12 g"));
    });
}

#[test]
fn ingredient_lookup_ignores_case() {
    common::with_test_connection(|conn| {
        let mut seeder = Seeder::new(conn).unwrap();
        let first = seeder.ingredient_id("Rose Hip Oil").unwrap();
        let second = seeder.ingredient_id("rose hip OIL").unwrap();
        assert_eq!(first, second);
    });
}

#[test]
fn sample_iterations_are_not_repeated() {
    common::with_test_connection(|conn| {
        let first = seed::seed_catalog(conn, true).unwrap();
        let second = seed::seed_catalog(conn, true).unwrap();
        assert_eq!(second.iterations_created, 0);
        assert_eq!(
            second.iterations_existing,
            first.iterations_created + first.iterations_existing
        );

        let hand_cream = query::recipe_by_title(conn, "Hand Cream").unwrap().unwrap();
        let versions = iterations::list_iterations(conn, hand_cream.id).unwrap();
        assert!(versions.len() >= 2);
        assert!(versions[0].version_number > versions[1].version_number);
    });
}

#[test]
fn stale_name_cache_falls_back_to_the_stored_row() {
    common::with_test_connection(|conn| {
        let mut known = HashMap::new();
        let stored = query::add_ingredient(
            conn,
            &NewIngredient {
                name: "Seed Test Kaolin Clay",
                description: None,
            },
        )
        .unwrap();

        let (id, created) =
            seed::resolve_ingredient(conn, &mut known, "seed test kaolin CLAY", None).unwrap();
        assert_eq!(id, stored.id);
        assert!(!created);
        assert_eq!(known.get("seed test kaolin clay"), Some(&stored.id));

        let (again, _) =
            seed::resolve_ingredient(conn, &mut known, "Seed Test Kaolin Clay", None).unwrap();
        assert_eq!(again, stored.id);
    });
}

const GOOD_LINES: &[CatalogIngredient] = &[CatalogIngredient {
    name: "Seed Test Aloe Gel",
    quantity: "60%",
}];

const BAD_LINES: &[CatalogIngredient] = &[
    CatalogIngredient {
        name: "Seed Test Rolled Back Resin",
        quantity: "10g",
    },
    CatalogIngredient {
        name: "Seed Test Unmeasured Oil",
        quantity: "",
    },
];

#[test]
fn failed_recipe_is_counted_and_the_rest_commit() {
    let recipes = [
        CatalogRecipe {
            title: "Seed Test Gel",
            description: "first",
            instructions: "mix",
            ingredients: GOOD_LINES,
        },
        CatalogRecipe {
            title: "Seed Test Broken",
            description: "second",
            instructions: "mix",
            ingredients: BAD_LINES,
        },
        CatalogRecipe {
            title: "Seed Test Spray",
            description: "third",
            instructions: "mix",
            ingredients: GOOD_LINES,
        },
    ];
    common::with_test_connection(|conn| {
        let mut report = SeedReport::default();
        Seeder::new(conn)
            .unwrap()
            .seed_recipes(&recipes, &mut report);
        assert_eq!(report.recipes_failed, 1);
        assert_eq!(report.recipes_created, 2);
        assert_eq!(report.links_created, 2);

        assert!(query::recipe_by_title(conn, "Seed Test Gel").unwrap().is_some());
        assert!(query::recipe_by_title(conn, "Seed Test Spray").unwrap().is_some());
        assert!(query::recipe_by_title(conn, "Seed Test Broken").unwrap().is_none());
        assert!(query::ingredient_by_name(conn, "Seed Test Rolled Back Resin")
            .unwrap()
            .is_none());

        let mut seeder = Seeder::new(conn).unwrap();
        seeder.ingredient_id("Seed Test Rolled Back Resin").unwrap();
    });
}

#[test]
fn failed_iteration_is_counted_and_the_rest_are_recorded() {
    common::with_test_connection(|conn| {
        let mut seeder = Seeder::new(conn).unwrap();
        let mut report = SeedReport::default();
        seeder.seed_recipes(catalog::recipes(), &mut report);

        let mut samples = catalog::sample_iterations();
        // jsonb has no representation for \u0000, so this sample's insert is refused.
        samples[0].metrics = serde_json::json!({ "scent": "\u{0}" });
        let expected = samples.len() - 1;
        seeder.seed_iterations(&samples, &mut report);
        assert_eq!(report.iterations_failed, 1);
        assert_eq!(report.iterations_created + report.iterations_existing, expected);
    });
}
