// Copyright 2023 Remi Bernotavicius

//! The recipes a fresh project starts with. Quantities are written the way the recipe cards have
//! them and get parsed on the way in.

#[derive(Debug)]
pub struct CatalogIngredient {
    pub name: &'static str,
    pub quantity: &'static str,
}

#[derive(Debug)]
pub struct CatalogRecipe {
    pub title: &'static str,
    pub description: &'static str,
    pub instructions: &'static str,
    pub ingredients: &'static [CatalogIngredient],
}

const fn line(name: &'static str, quantity: &'static str) -> CatalogIngredient {
    CatalogIngredient { name, quantity }
}

const RECIPES: &[CatalogRecipe] = &[
    CatalogRecipe {
        title: "Beard Oil",
        description: "A nourishing oil for beard care",
        instructions: "Combine all ingredients in a glass bottle. Shake well before each use. \
            Apply a few drops to palm, rub hands together, and massage through beard.",
        ingredients: &[
            line("Jojoba Oil", "40%; 12g"),
            line("Essential Oils", "1%; 0.3g"),
        ],
    },
    CatalogRecipe {
        title: "Beard Balm",
        description: "A styling balm that conditions and shapes your beard",
        instructions: "Melt beeswax, shea butter, cocoa butter, and mango butter in a double \
            boiler. Remove from heat and stir in lanolin and arrowroot powder. Pour into \
            containers and let cool.",
        ingredients: &[
            line("Beeswax", "33%; 19.8g"),
            line("Unrefined Shea Butter", "20%; 12g"),
            line("Cocoa Butter", "22%; 13.2g"),
            line("Unrefined Mango Butter", "15%; 9g"),
            line("Lanolin", "10%; 6g"),
            line("Arrowroot Powder", "5%; 3g"),
        ],
    },
    CatalogRecipe {
        title: "Mustache Wax",
        description: "A strong-hold wax for styling mustaches",
        instructions: "Melt carnauba wax in a double boiler. Add lanolin and jojoba oil, \
            stirring until combined. Pour into small containers and let cool completely before \
            use.",
        ingredients: &[
            line("Carnauba Wax", "40%; 12g"),
            line("Lanolin", "45%; 13.5g"),
            line("Jojoba Oil", "15%; 4.5g"),
        ],
    },
    CatalogRecipe {
        title: "Foaming Hand Soap",
        description: "A gentle, natural foaming soap for everyday hand washing",
        instructions: "Pour distilled water into a foaming soap dispenser. Add castile soap, \
            sweet almond oil, and essential oils. Gently swirl to mix (do not shake vigorously).",
        ingredients: &[
            line("Distilled Water", "1 cup (240 mL)"),
            line("Liquid Castile Soap", "2 tablespoons (30 mL)"),
            line("Sweet Almond Oil", "1 teaspoon (5 mL)"),
            line("Essential Oils", "10-15 drops"),
        ],
    },
    CatalogRecipe {
        title: "Hand Cream",
        description: "A rich, moisturizing cream for dry hands",
        instructions: "Melt shea butter, cocoa butter, and beeswax in a double boiler. Remove \
            from heat and add sweet almond oil and lanolin. Let cool slightly, then add essential \
            oils. Pour into jars and cool completely.",
        ingredients: &[
            line("Unrefined Shea Butter", "40%; 12g"),
            line("Cocoa Butter", "25%; 7.5g"),
            line("Sweet Almond Oil", "20%; 6g"),
            line("Beeswax", "10%; 3g"),
            line("Lanolin", "5%; 1.5g"),
            line("Cedarwood Atlas Oil", "1%; 0.3g"),
            line("Bergaptene-Free Bergamot Oil", "1%; 0.3g"),
        ],
    },
    CatalogRecipe {
        title: "Hair Rinse",
        description: "A clarifying rinse to remove buildup and add shine",
        instructions: "Brew green tea with hot water and let cool. Mix in aloe vera juice and \
            apple cider vinegar. Add essential oils and shake well. Apply to hair after \
            shampooing, let sit for 2-3 minutes, then rinse with cool water.",
        ingredients: &[
            line("Water", "1 cup"),
            line("Green Tea", "2 bags"),
            line("Aloe Vera Juice", "1/2 cup"),
            line("Apple Cider Vinegar", "1/2 cup"),
            line("Rosemary Essential Oil", "10 drops"),
            line("Peppermint Essential Oil", "6 drops"),
        ],
    },
];

pub fn recipes() -> &'static [CatalogRecipe] {
    RECIPES
}

#[derive(Debug, Clone)]
pub struct SampleIteration {
    pub recipe: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub notes: &'static str,
    pub metrics: serde_json::Value,
}

/// Listed oldest first per recipe so versions come out in order.
pub fn sample_iterations() -> Vec<SampleIteration> {
    use serde_json::json;

    vec![
        SampleIteration {
            recipe: "Beard Oil",
            title: "Initial Blend",
            description: "Straight jojoba with a light essential oil load",
            notes: "Absorbs well but the scent fades by midday",
            metrics: json!({ "absorption": 8, "scent": 5, "shine": 6 }),
        },
        SampleIteration {
            recipe: "Beard Oil",
            title: "Stronger Scent",
            description: "Essential oils raised to the upper end of the safe range",
            notes: "Scent lasts the day without irritation",
            metrics: json!({ "absorption": 8, "scent": 8, "shine": 6 }),
        },
        SampleIteration {
            recipe: "Hand Cream",
            title: "Original Ratio",
            description: "First pass at the butter blend",
            notes: "Too greasy on application",
            metrics: json!({ "absorption": 5, "hydration": 8, "greasiness": 7 }),
        },
        SampleIteration {
            recipe: "Hand Cream",
            title: "Less Cocoa Butter",
            description: "Cocoa butter reduced in favour of sweet almond oil",
            notes: "Absorbs faster and still hydrates well",
            metrics: json!({ "absorption": 7, "hydration": 8, "greasiness": 4 }),
        },
        SampleIteration {
            recipe: "Hair Rinse",
            title: "Basic Rinse",
            description: "Tea and vinegar only",
            notes: "Clarifies well, vinegar smell lingers",
            metrics: json!({ "shine": 7, "scent": 3 }),
        },
    ]
}

#[test]
fn every_catalog_quantity_parses() {
    use crate::quantity::Measure;

    for recipe in recipes() {
        assert!(!recipe.ingredients.is_empty(), "{} has no ingredients", recipe.title);
        for ingredient in recipe.ingredients {
            let measure = Measure::parse(ingredient.quantity).unwrap();
            assert!(
                !measure.primary.amount.is_empty(),
                "{}: {}",
                recipe.title,
                ingredient.quantity
            );
        }
    }
}

#[test]
fn sample_iterations_refer_to_catalog_recipes() {
    let titles: Vec<&str> = recipes().iter().map(|r| r.title).collect();
    for sample in sample_iterations() {
        assert!(titles.contains(&sample.recipe), "{}", sample.recipe);
    }
}

#[test]
fn catalog_titles_are_unique() {
    let mut titles: Vec<&str> = recipes().iter().map(|r| r.title).collect();
    titles.sort();
    titles.dedup();
    assert_eq!(titles.len(), recipes().len());
}
