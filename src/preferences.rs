// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    NewUserPreferences, Theme, UserId, UserPreferences, UserPreferencesChangeset,
};
use crate::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;
use std::str::FromStr as _;

pub const DEFAULT_VOLUME: f32 = 0.7;
pub const DEFAULT_AUDIO_ENABLED: bool = true;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preferences {
    pub user_id: UserId,
    pub theme: Theme,
    pub audio_enabled: bool,
    pub volume: f32,
    pub display_name: Option<String>,
    /// False when these are the defaults for a user with no saved row.
    pub stored: bool,
}

impl Preferences {
    pub fn defaults(user_id: UserId) -> Self {
        Self {
            user_id,
            theme: Theme::default(),
            audio_enabled: DEFAULT_AUDIO_ENABLED,
            volume: DEFAULT_VOLUME,
            display_name: None,
            stored: false,
        }
    }
}

impl From<UserPreferences> for Preferences {
    fn from(row: UserPreferences) -> Self {
        Self {
            user_id: row.user_id,
            theme: row.theme,
            audio_enabled: row.audio_enabled,
            volume: row.volume,
            display_name: row.display_name,
            stored: true,
        }
    }
}

/// The stored row, or the defaults without writing anything.
pub fn get(conn: &mut database::Connection, user: UserId) -> Result<Preferences> {
    use database::schema::user_preferences::dsl::*;

    let row = user_preferences
        .select(UserPreferences::as_select())
        .filter(user_id.eq(user))
        .get_result(conn)
        .optional()?;
    Ok(row.map_or_else(|| Preferences::defaults(user), Preferences::from))
}

#[derive(Debug, Clone, Default)]
pub struct PreferencesUpdate {
    pub theme: Option<String>,
    pub audio_enabled: Option<bool>,
    pub volume: Option<f32>,
    pub display_name: Option<String>,
}

impl PreferencesUpdate {
    pub fn validate(&self) -> Result<UserPreferencesChangeset> {
        let theme = self
            .theme
            .as_deref()
            .map(|t| {
                Theme::from_str(t.trim()).map_err(|_| {
                    let known: Vec<String> = Theme::iter().map(|t| t.to_string()).collect();
                    Error::InvalidPreference(format!(
                        "unknown theme {t:?}, expected one of {}",
                        known.join(", ")
                    ))
                })
            })
            .transpose()?;

        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::InvalidPreference(format!(
                    "volume {volume} is outside 0 to 1"
                )));
            }
        }

        let changeset = UserPreferencesChangeset {
            theme,
            audio_enabled: self.audio_enabled,
            volume: self.volume,
            display_name: self.display_name.clone(),
        };
        if changeset.theme.is_none()
            && changeset.audio_enabled.is_none()
            && changeset.volume.is_none()
            && changeset.display_name.is_none()
        {
            return Err(Error::InvalidPreference("nothing to update".into()));
        }
        Ok(changeset)
    }
}

/// Inserts the user's row with defaults for anything not given, or updates only the given fields
/// of an existing row.
pub fn update(
    conn: &mut database::Connection,
    user: UserId,
    update: &PreferencesUpdate,
) -> Result<Preferences> {
    use database::schema::user_preferences::dsl::*;

    let changeset = update.validate()?;
    let new_row = NewUserPreferences {
        user_id: user,
        theme: changeset.theme.unwrap_or_default(),
        audio_enabled: changeset.audio_enabled.unwrap_or(DEFAULT_AUDIO_ENABLED),
        volume: changeset.volume.unwrap_or(DEFAULT_VOLUME),
        display_name: changeset.display_name.as_deref(),
    };

    let row = diesel::insert_into(user_preferences)
        .values(&new_row)
        .on_conflict(user_id)
        .do_update()
        .set(&changeset)
        .returning(UserPreferences::as_returning())
        .get_result(conn)?;
    log::info!("saved preferences for {user}");
    Ok(row.into())
}

#[test]
fn defaults_are_hackers_with_audio() {
    let user = UserId::random();
    let prefs = Preferences::defaults(user);
    assert_eq!(prefs.theme, Theme::Hackers);
    assert!(prefs.audio_enabled);
    assert_eq!(prefs.volume, 0.7);
    assert!(!prefs.stored);
}

#[test]
fn update_validation() {
    let changeset = PreferencesUpdate {
        theme: Some("Neotopia".into()),
        volume: Some(1.0),
        ..Default::default()
    }
    .validate()
    .unwrap();
    assert_eq!(changeset.theme, Some(Theme::Neotopia));
    assert_eq!(changeset.volume, Some(1.0));
    assert_eq!(changeset.audio_enabled, None);

    let e = PreferencesUpdate {
        theme: Some("solarized".into()),
        ..Default::default()
    }
    .validate()
    .unwrap_err();
    assert_eq!(
        e.to_string(),
        "invalid preference: unknown theme \"solarized\", expected one of hackers, dystopia, neotopia"
    );

    for volume in [-0.1, 1.01, f32::NAN] {
        let update = PreferencesUpdate {
            volume: Some(volume),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(Error::InvalidPreference(_))));
    }

    assert!(matches!(
        PreferencesUpdate::default().validate(),
        Err(Error::InvalidPreference(_))
    ));
}
