// Copyright 2023 Remi Bernotavicius

mod common;

use diy_recipes_admin::database::models::{NewIngredient, NewRecipe, NewRecipeIngredient};
use diy_recipes_admin::database::query;
use diy_recipes_admin::dedup;

const TITLE: &str = "Dedup Test Soap";

#[test]
fn duplicate_without_ingredients_is_removed() {
    common::with_test_connection(|conn| {
        let new_recipe = NewRecipe {
            title: TITLE,
            description: None,
            instructions: None,
        };
        let with_ingredients = query::add_recipe(conn, &new_recipe).unwrap();
        let empty = query::add_recipe(conn, &new_recipe).unwrap();
        let soap = query::add_ingredient(
            conn,
            &NewIngredient {
                name: "Dedup Test Castile",
                description: None,
            },
        )
        .unwrap();
        query::add_recipe_ingredient(
            conn,
            &NewRecipeIngredient {
                recipe_id: with_ingredients.id,
                ingredient_id: soap.id,
                quantity: "2",
                unit: "tbsp",
                notes: None,
            },
        )
        .unwrap();

        let plan = dedup::plan(dedup::candidates(conn).unwrap());
        let group = plan.groups.iter().find(|g| g.title == TITLE).unwrap();
        assert_eq!(group.keep.id, with_ingredients.id);
        assert_eq!(group.delete.len(), 1);
        assert_eq!(group.delete[0].id, empty.id);

        let only_ours = dedup::DedupPlan {
            groups: vec![group.clone()],
        };
        assert_eq!(dedup::apply(conn, &only_ours).unwrap(), 1);

        let survivor = query::find_recipe(conn, TITLE).unwrap();
        assert_eq!(survivor.id, with_ingredients.id);
        assert!(query::recipe_by_id(conn, empty.id).is_err());
        assert_eq!(query::recipe_ingredients(conn, &survivor).unwrap().len(), 1);
    });
}

#[test]
fn title_lookup_picks_the_copy_dedup_keeps() {
    const LOTION: &str = "Dedup Test Lotion";
    common::with_test_connection(|conn| {
        let new_recipe = NewRecipe {
            title: LOTION,
            description: None,
            instructions: None,
        };
        let copies = [
            query::add_recipe(conn, &new_recipe).unwrap(),
            query::add_recipe(conn, &new_recipe).unwrap(),
        ];
        let butter = query::add_ingredient(
            conn,
            &NewIngredient {
                name: "Dedup Test Shea",
                description: None,
            },
        )
        .unwrap();
        // Whichever copy sorts last by id gets the ingredients, so id order alone would pick wrong.
        let with_ingredients = copies.iter().map(|r| r.id).max().unwrap();
        query::add_recipe_ingredient(
            conn,
            &NewRecipeIngredient {
                recipe_id: with_ingredients,
                ingredient_id: butter.id,
                quantity: "20",
                unit: "%",
                notes: None,
            },
        )
        .unwrap();

        let plan = dedup::plan(dedup::candidates(conn).unwrap());
        let group = plan.groups.iter().find(|g| g.title == LOTION).unwrap();
        assert_eq!(group.keep.id, with_ingredients);
        let found = query::recipe_by_title(conn, LOTION).unwrap().unwrap();
        assert_eq!(found.id, group.keep.id);
    });
}
