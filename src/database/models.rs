// Copyright 2023 Remi Bernotavicius

use crate::quantity::Quantity;
use chrono::{DateTime, Utc};
use derive_more::Display;
use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::{AsChangeset, Insertable};
use diesel_derive_enum::DbEnum;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{EnumIter, EnumString};
use uuid::Uuid;

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecipeId(Uuid);

impl FromStr for RecipeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IngredientId(Uuid);

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeIngredientId(Uuid);

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationId(Uuid);

impl FromStr for IterationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationIngredientId(Uuid);

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(table_name = crate::database::schema::recipes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Recipe {
    pub id: RecipeId,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub instructions: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(table_name = crate::database::schema::ingredients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecipeIngredient {
    pub id: RecipeIngredientId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub quantity: String,
    pub unit: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RecipeIngredient {
    pub fn measure(&self) -> Quantity {
        Quantity::new(&self.quantity, &self.unit)
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct NewRecipeIngredient<'a> {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub quantity: &'a str,
    pub unit: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::recipe_iterations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecipeIteration {
    pub id: IterationId,
    pub recipe_id: RecipeId,
    pub version_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub metrics: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_iterations)]
pub struct NewRecipeIteration<'a> {
    pub recipe_id: RecipeId,
    pub version_number: i32,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub metrics: Option<&'a serde_json::Value>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(belongs_to(RecipeIteration, foreign_key = iteration_id))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::iteration_ingredients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IterationIngredient {
    pub id: IterationIngredientId,
    pub iteration_id: IterationId,
    pub ingredient_id: IngredientId,
    pub quantity: String,
    pub unit: String,
    pub notes: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::iteration_ingredients)]
pub struct NewIterationIngredient<'a> {
    pub iteration_id: IterationId,
    pub ingredient_id: IngredientId,
    pub quantity: &'a str,
    pub unit: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(
    Debug,
    Default,
    Display,
    EnumIter,
    EnumString,
    Hash,
    Copy,
    Clone,
    PartialEq,
    Eq,
    DbEnum,
    Serialize,
    Deserialize,
)]
#[ExistingTypePath = "crate::database::schema::sql_types::ThemeName"]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    #[display("hackers")]
    Hackers,
    #[display("dystopia")]
    Dystopia,
    #[display("neotopia")]
    Neotopia,
}

impl Theme {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, Serialize)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::database::schema::user_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserPreferences {
    pub user_id: UserId,
    pub theme: Theme,
    pub audio_enabled: bool,
    pub volume: f32,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::user_preferences)]
pub struct NewUserPreferences<'a> {
    pub user_id: UserId,
    pub theme: Theme,
    pub audio_enabled: bool,
    pub volume: f32,
    pub display_name: Option<&'a str>,
}

#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = crate::database::schema::user_preferences)]
pub struct UserPreferencesChangeset {
    pub theme: Option<Theme>,
    pub audio_enabled: Option<bool>,
    pub volume: Option<f32>,
    pub display_name: Option<String>,
}

#[test]
fn theme_names_match_database_labels() {
    let names: Vec<String> = Theme::iter().map(|t| t.to_string()).collect();
    assert_eq!(names, ["hackers", "dystopia", "neotopia"]);
    assert_eq!(Theme::from_str("Dystopia").unwrap(), Theme::Dystopia);
    assert!(Theme::from_str("solarized").is_err());
}

#[test]
fn ids_parse_from_cli_text() {
    let raw = "6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e";
    let id: RecipeId = format!("  {raw} ").parse().unwrap();
    assert_eq!(id.to_string(), raw);
    assert!("not-a-uuid".parse::<RecipeId>().is_err());
}
