// Copyright 2023 Remi Bernotavicius

//! Loads the built-in catalogue. Running it again finds what is already there and only fills in
//! what is missing.

use crate::database;
use crate::database::models::{IngredientId, NewIngredient, NewRecipe, NewRecipeIngredient, RecipeId};
use crate::database::query;
use crate::iterations::{self, NewIterationInput};
use crate::quantity::Measure;
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub mod catalog;
pub mod legacy;

pub use catalog::CatalogRecipe;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub recipes_created: usize,
    pub recipes_reused: usize,
    pub recipes_failed: usize,
    pub ingredients_created: usize,
    pub links_created: usize,
    pub links_existing: usize,
    pub iterations_created: usize,
    pub iterations_existing: usize,
    pub iterations_failed: usize,
}

impl SeedReport {
    fn record(&mut self, seeded: &SeededRecipe) {
        if seeded.created {
            self.recipes_created += 1;
        } else {
            self.recipes_reused += 1;
        }
        self.ingredients_created += seeded.ingredients_created;
        self.links_created += seeded.links_created;
        self.links_existing += seeded.links_existing;
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recipes: {} created, {} reused, {} failed; ingredients: {} created; \
             links: {} created, {} already present",
            self.recipes_created,
            self.recipes_reused,
            self.recipes_failed,
            self.ingredients_created,
            self.links_created,
            self.links_existing,
        )?;
        if self.iterations_created + self.iterations_existing + self.iterations_failed > 0 {
            write!(
                f,
                "; iterations: {} created, {} already present, {} failed",
                self.iterations_created, self.iterations_existing, self.iterations_failed
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRecipe {
    pub recipe_id: RecipeId,
    pub created: bool,
    pub ingredients_created: usize,
    pub links_created: usize,
    pub links_existing: usize,
}

/// Finds an ingredient by case-insensitive name, consulting `known` first and inserting it if needed.
/// Returns whether a row was created.
///
/// The insert runs in a savepoint so that losing a race on the unique name index leaves the
/// surrounding transaction usable for the re-select.
pub fn resolve_ingredient(
    conn: &mut database::Connection,
    known: &mut HashMap<String, IngredientId>,
    name: &str,
    description: Option<&str>,
) -> Result<(IngredientId, bool)> {
    let name = name.trim();
    let key = name.to_lowercase();
    if let Some(id) = known.get(&key) {
        return Ok((*id, false));
    }

    let new_ingredient = NewIngredient { name, description };
    let inserted = conn.transaction::<_, Error, _>(|conn| query::add_ingredient(conn, &new_ingredient));
    let (id, created) = match inserted {
        Ok(ingredient) => {
            log::debug!("inserted ingredient {name:?} ({})", ingredient.id);
            (ingredient.id, true)
        }
        Err(e) if e.is_unique_violation() => {
            log::debug!("ingredient {name:?} appeared concurrently, selecting it");
            let existing = query::ingredient_by_name(conn, name)?
                .ok_or_else(|| Error::NotFound(format!("ingredient {name:?}")))?;
            (existing.id, false)
        }
        Err(e) => return Err(e),
    };
    known.insert(key, id);
    Ok((id, created))
}

fn seed_recipe_with(
    conn: &mut database::Connection,
    known: &mut HashMap<String, IngredientId>,
    recipe: &CatalogRecipe,
) -> Result<SeededRecipe> {
    let (stored, created) = match query::recipe_by_title(conn, recipe.title)? {
        Some(existing) => (existing, false),
        None => {
            let new_recipe = NewRecipe {
                title: recipe.title,
                description: Some(recipe.description),
                instructions: Some(recipe.instructions),
            };
            (query::add_recipe(conn, &new_recipe)?, true)
        }
    };

    let mut seeded = SeededRecipe {
        recipe_id: stored.id,
        created,
        ingredients_created: 0,
        links_created: 0,
        links_existing: 0,
    };

    for line in recipe.ingredients {
        let measure = Measure::parse(line.quantity)?;
        let description = format!("Ingredient for {}: {}", recipe.title, line.name);
        let (ingredient_id, new_ingredient) =
            resolve_ingredient(conn, known, line.name, Some(&description))?;
        if new_ingredient {
            seeded.ingredients_created += 1;
        }

        let notes = measure.notes();
        let link = NewRecipeIngredient {
            recipe_id: stored.id,
            ingredient_id,
            quantity: &measure.primary.amount,
            unit: &measure.primary.unit,
            notes: notes.as_deref(),
        };
        if query::add_recipe_ingredient(conn, &link)? {
            seeded.links_created += 1;
        } else {
            log::debug!("{} already lists {}", recipe.title, line.name);
            seeded.links_existing += 1;
        }
    }
    Ok(seeded)
}

pub struct Seeder<'conn> {
    conn: &'conn mut database::Connection,
    ingredients: HashMap<String, IngredientId>,
}

impl<'conn> Seeder<'conn> {
    pub fn new(conn: &'conn mut database::Connection) -> Result<Self> {
        let ingredients: HashMap<_, _> = query::all_ingredients(conn)?
            .into_iter()
            .map(|i| (i.name.to_lowercase(), i.id))
            .collect();
        log::info!("found {} existing ingredient(s)", ingredients.len());
        Ok(Self { conn, ingredients })
    }

    pub fn ingredient_id(&mut self, name: &str) -> Result<IngredientId> {
        let (id, _) = resolve_ingredient(self.conn, &mut self.ingredients, name, None)?;
        Ok(id)
    }

    /// Seeds one recipe in its own transaction. On failure nothing of the recipe is kept, including
    /// names cached for ingredients it inserted.
    pub fn seed_recipe(&mut self, recipe: &CatalogRecipe) -> Result<SeededRecipe> {
        let mut staged = self.ingredients.clone();
        let seeded = self
            .conn
            .transaction::<_, Error, _>(|conn| seed_recipe_with(conn, &mut staged, recipe))?;
        self.ingredients = staged;
        Ok(seeded)
    }

    pub fn seed_recipes(&mut self, recipes: &[CatalogRecipe], report: &mut SeedReport) {
        for recipe in recipes {
            match self.seed_recipe(recipe) {
                Ok(seeded) => {
                    log::info!(
                        "{} {:?} ({}): {} new link(s), {} existing",
                        if seeded.created { "created" } else { "reused" },
                        recipe.title,
                        seeded.recipe_id,
                        seeded.links_created,
                        seeded.links_existing
                    );
                    report.record(&seeded);
                }
                Err(e) => {
                    log::error!("seeding {:?} failed: {e}", recipe.title);
                    report.recipes_failed += 1;
                }
            }
        }
    }

    fn seed_iteration(&mut self, sample: &catalog::SampleIteration) -> Result<Option<bool>> {
        let Some(recipe) = query::recipe_by_title(self.conn, sample.recipe)? else {
            return Ok(None);
        };
        if iterations::iteration_by_title(self.conn, recipe.id, sample.title)?.is_some() {
            return Ok(Some(false));
        }
        let input = NewIterationInput {
            title: sample.title.into(),
            description: Some(sample.description.into()),
            notes: Some(sample.notes.into()),
            metrics: Some(sample.metrics.clone()),
        };
        iterations::create_iteration(self.conn, recipe.id, &input)?;
        Ok(Some(true))
    }

    /// Records each sample iteration unless its recipe already has one with the same title. A
    /// failure is logged and counted and the remaining samples still run.
    pub fn seed_iterations(&mut self, samples: &[catalog::SampleIteration], report: &mut SeedReport) {
        for sample in samples {
            match self.seed_iteration(sample) {
                Ok(Some(true)) => report.iterations_created += 1,
                Ok(Some(false)) => report.iterations_existing += 1,
                Ok(None) => {
                    log::warn!("no recipe {:?}, skipping iteration {:?}", sample.recipe, sample.title)
                }
                Err(e) => {
                    log::error!(
                        "recording iteration {:?} of {:?} failed: {e}",
                        sample.title,
                        sample.recipe
                    );
                    report.iterations_failed += 1;
                }
            }
        }
    }
}

pub fn seed_catalog(conn: &mut database::Connection, with_iterations: bool) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut seeder = Seeder::new(conn)?;
    seeder.seed_recipes(catalog::recipes(), &mut report);
    if with_iterations {
        seeder.seed_iterations(&catalog::sample_iterations(), &mut report);
    }
    Ok(report)
}

#[test]
fn report_summary() {
    let mut report = SeedReport::default();
    report.record(&SeededRecipe {
        recipe_id: "6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e".parse().unwrap(),
        created: true,
        ingredients_created: 2,
        links_created: 2,
        links_existing: 0,
    });
    report.record(&SeededRecipe {
        recipe_id: "0b6a36a3-8f0e-4c55-9d1a-3b9c7f3c2e11".parse().unwrap(),
        created: false,
        ingredients_created: 0,
        links_created: 0,
        links_existing: 3,
    });
    assert_eq!(
        report.to_string(),
        "recipes: 1 created, 1 reused, 0 failed; ingredients: 2 created; \
         links: 2 created, 3 already present"
    );

    report.iterations_created = 2;
    report.iterations_failed = 1;
    assert!(report
        .to_string()
        .ends_with("; iterations: 2 created, 0 already present, 1 failed"));
}
