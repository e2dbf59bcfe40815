// Copyright 2023 Remi Bernotavicius

//! Cleanup for recipes that were imported more than once under the same title.

use crate::database;
use crate::database::models::{Recipe, RecipeId};
use crate::database::query;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;
use diesel::prelude::Connection as _;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCandidate {
    pub id: RecipeId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub ingredient_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub title: String,
    pub keep: DuplicateCandidate,
    pub delete: Vec<DuplicateCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupPlan {
    pub groups: Vec<DuplicateGroup>,
}

impl DedupPlan {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn doomed(&self) -> impl Iterator<Item = &DuplicateCandidate> {
        self.groups.iter().flat_map(|g| g.delete.iter())
    }
}

/// Groups candidates by exact title and keeps the one [`query::survivor_rank`] puts first.
pub fn plan(candidates: Vec<DuplicateCandidate>) -> DedupPlan {
    let mut by_title: BTreeMap<String, Vec<DuplicateCandidate>> = BTreeMap::new();
    for candidate in candidates {
        by_title
            .entry(candidate.title.clone())
            .or_default()
            .push(candidate);
    }

    let groups = by_title
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .filter_map(|(title, mut members)| {
            members.sort_by_key(|c| query::survivor_rank(c.ingredient_count, c.created_at, c.id));
            let mut members = members.into_iter();
            let keep = members.next()?;
            Some(DuplicateGroup {
                title,
                keep,
                delete: members.collect(),
            })
        })
        .collect();
    DedupPlan { groups }
}

pub fn candidates(conn: &mut database::Connection) -> Result<Vec<DuplicateCandidate>> {
    let counts = query::ingredient_counts(conn)?;
    Ok(query::all_recipes(conn)?
        .into_iter()
        .map(|Recipe { id, title, created_at, .. }| DuplicateCandidate {
            ingredient_count: counts.get(&id).copied().unwrap_or(0),
            id,
            title,
            created_at,
        })
        .collect())
}

/// Deletes every recipe the plan marks, each in its own transaction. Returns how many went.
pub fn apply(conn: &mut database::Connection, plan: &DedupPlan) -> Result<usize> {
    let mut deleted = 0;
    for doomed in plan.doomed() {
        let removed =
            conn.transaction::<_, Error, _>(|conn| query::delete_recipe(conn, doomed.id))?;
        log::info!("deleted duplicate {:?} ({})", doomed.title, doomed.id);
        deleted += removed;
    }
    Ok(deleted)
}

pub fn describe(plan: &DedupPlan) -> String {
    let mut out = String::new();
    for group in &plan.groups {
        out.push_str(&format!(
            "{:?}: keeping {} ({} ingredient(s), created {})\n",
            group.title, group.keep.id, group.keep.ingredient_count, group.keep.created_at
        ));
        for doomed in &group.delete {
            out.push_str(&format!(
                "    delete {} ({} ingredient(s), created {})\n",
                doomed.id, doomed.ingredient_count, doomed.created_at
            ));
        }
    }
    out
}

/// Whether an answer to the delete prompt confirms it. Case is ignored.
pub fn is_confirmation(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn validate_answer(answer: &str) -> std::result::Result<(), String> {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("no") {
        Ok(())
    } else {
        Err(format!("type yes or no, not {answer:?}"))
    }
}

pub fn confirm(count: usize) -> Result<bool> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Delete {count} duplicate recipe(s)? Type 'yes' to continue"
        ))
        .validate_with(|answer: &String| validate_answer(answer))
        .interact_text()?;
    Ok(is_confirmation(&answer))
}

#[cfg(test)]
fn candidate(id: &str, title: &str, day: u32, ingredient_count: i64) -> DuplicateCandidate {
    use chrono::TimeZone as _;

    DuplicateCandidate {
        id: id.parse().unwrap(),
        title: title.into(),
        created_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
        ingredient_count,
    }
}

#[cfg(test)]
const ID_A: &str = "00000000-0000-0000-0000-00000000000a";
#[cfg(test)]
const ID_B: &str = "00000000-0000-0000-0000-00000000000b";
#[cfg(test)]
const ID_C: &str = "00000000-0000-0000-0000-00000000000c";

#[test]
fn keeps_the_copy_with_ingredients() {
    let plan = plan(vec![
        candidate(ID_A, "Beard Oil", 3, 0),
        candidate(ID_B, "Beard Oil", 1, 2),
        candidate(ID_C, "Hand Cream", 1, 7),
    ]);
    assert_eq!(plan.groups.len(), 1);
    let group = &plan.groups[0];
    assert_eq!(group.title, "Beard Oil");
    assert_eq!(group.keep.id.to_string(), ID_B);
    assert_eq!(group.delete.len(), 1);
    assert_eq!(group.delete[0].id.to_string(), ID_A);
}

#[test]
fn newest_wins_among_equals_then_id() {
    let plan = plan(vec![
        candidate(ID_A, "Hair Rinse", 1, 6),
        candidate(ID_C, "Hair Rinse", 4, 6),
        candidate(ID_B, "Hair Rinse", 4, 6),
    ]);
    let group = &plan.groups[0];
    assert_eq!(group.keep.id.to_string(), ID_B);
    let doomed: Vec<String> = group.delete.iter().map(|c| c.id.to_string()).collect();
    assert_eq!(doomed, [ID_C, ID_A]);
    assert_eq!(plan.doomed().count(), 2);
}

#[test]
fn titles_must_match_exactly() {
    let plan = plan(vec![
        candidate(ID_A, "Beard Oil", 1, 2),
        candidate(ID_B, "beard oil", 2, 2),
    ]);
    assert!(plan.is_empty());
    assert!(describe(&plan).is_empty());
}

#[test]
fn plan_is_described() {
    let plan = plan(vec![
        candidate(ID_A, "Beard Oil", 3, 0),
        candidate(ID_B, "Beard Oil", 1, 2),
    ]);
    let text = describe(&plan);
    assert!(text.starts_with(&format!("\"Beard Oil\": keeping {ID_B} (2 ingredient(s)")));
    assert!(text.contains(&format!("    delete {ID_A} (0 ingredient(s)")));
}

#[test]
fn confirmation_ignores_case() {
    assert!(is_confirmation("yes"));
    assert!(is_confirmation("YES"));
    assert!(is_confirmation(" Yes\n"));
    assert!(!is_confirmation("y"));
    assert!(!is_confirmation("no"));
    assert!(!is_confirmation(""));
}

#[test]
fn only_yes_or_no_is_accepted_as_an_answer() {
    assert_eq!(validate_answer("Yes"), Ok(()));
    assert_eq!(validate_answer("NO"), Ok(()));
    assert_eq!(
        validate_answer("sure"),
        Err("type yes or no, not \"sure\"".to_owned())
    );
    assert!(validate_answer("").is_err());
}
