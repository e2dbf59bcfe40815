// Copyright 2023 Remi Bernotavicius

pub mod config;
pub mod database;
pub mod dedup;
pub mod diagnose;
pub mod error;
pub mod inspect;
pub mod iterations;
pub mod keys;
pub mod postgrest;
pub mod preferences;
pub mod provision;
pub mod quantity;
pub mod report;
pub mod seed;
pub mod smoke;

pub use error::{Error, Result};
