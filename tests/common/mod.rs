// Copyright 2023 Remi Bernotavicius

use diesel::prelude::Connection as _;
use diy_recipes_admin::database::{self, Connection};

pub const TEST_DATABASE_URL: &str = "DIY_RECIPES_TEST_DATABASE_URL";

/// Runs `f` on a migrated connection inside a transaction that is never committed. Returns `None`
/// (and the test passes vacuously) when no test database is configured.
pub fn with_test_connection<R>(f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
    let Ok(url) = std::env::var(TEST_DATABASE_URL) else {
        eprintln!("{TEST_DATABASE_URL} not set, skipping");
        return None;
    };
    let mut conn = database::establish_connection(&url).unwrap();
    conn.begin_test_transaction().unwrap();
    Some(f(&mut conn))
}
