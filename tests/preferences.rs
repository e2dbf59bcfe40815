// Copyright 2023 Remi Bernotavicius

mod common;

use diy_recipes_admin::database::models::{Theme, UserId};
use diy_recipes_admin::preferences::{self, PreferencesUpdate};
use diy_recipes_admin::Error;

#[test]
fn defaults_until_saved_then_partial_updates() {
    common::with_test_connection(|conn| {
        let user = UserId::random();
        let prefs = preferences::get(conn, user).unwrap();
        assert!(!prefs.stored);
        assert_eq!(prefs.theme, Theme::Hackers);

        let saved = preferences::update(
            conn,
            user,
            &PreferencesUpdate {
                theme: Some("dystopia".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(saved.stored);
        assert_eq!(saved.theme, Theme::Dystopia);
        assert_eq!(saved.volume, 0.7);
        assert!(saved.audio_enabled);

        let saved = preferences::update(
            conn,
            user,
            &PreferencesUpdate {
                audio_enabled: Some(false),
                volume: Some(0.25),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(saved.theme, Theme::Dystopia);
        assert!(!saved.audio_enabled);
        assert_eq!(saved.volume, 0.25);

        assert_eq!(preferences::get(conn, user).unwrap(), saved);
    });
}

#[test]
fn invalid_updates_never_reach_the_database() {
    common::with_test_connection(|conn| {
        let user = UserId::random();
        let result = preferences::update(
            conn,
            user,
            &PreferencesUpdate {
                volume: Some(1.5),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidPreference(_))));
        assert!(!preferences::get(conn, user).unwrap().stored);
    });
}
