// Copyright 2023 Remi Bernotavicius

use crate::database::models::RecipeId;
use crate::postgrest::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("environment variable {0} is not set (checked .env.local and .env)")]
    MissingEnv(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("could not connect to database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),
    #[error("invalid preference: {0}")]
    InvalidPreference(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("version {version} of recipe {recipe} was created concurrently")]
    VersionConflict { recipe: RecipeId, version: i32 },
    #[error("aborted by operator")]
    Aborted,
}

impl Error {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
