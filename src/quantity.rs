// Copyright 2023 Remi Bernotavicius

//! Free-text ingredient amounts such as `40%; 12g` or `1 cup (240 mL)`, and the canonical
//! amount/unit pair they are stored as.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static LEADING_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<amount>\d+(?:\.\d+)?(?:\s*[/-]\s*\d+(?:\.\d+)?)?)\s*(?P<unit>.*)$")
        .unwrap()
});

static PARENTHESISED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<outer>[^()]+?)\s*\((?P<inner>[^()]+)\)$").unwrap());

pub fn normalize_unit(unit: &str) -> String {
    let lower = unit.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "tablespoon" | "tablespoons" | "tbsp" | "tbs" => "tbsp",
        "teaspoon" | "teaspoons" | "tsp" => "tsp",
        "cup" | "cups" => "cup",
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => "ml",
        "g" | "gram" | "grams" => "g",
        "%" | "percent" => "%",
        "drop" | "drops" => "drops",
        "bag" | "bags" => "bags",
        _ => return lower,
    };
    canonical.to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quantity {
    pub amount: String,
    pub unit: String,
}

impl Quantity {
    /// Wraps an already canonical pair, as stored in the database.
    pub fn new(amount: &str, unit: &str) -> Self {
        Self {
            amount: amount.trim().to_owned(),
            unit: unit.trim().to_owned(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidQuantity(text.into()));
        }
        match LEADING_AMOUNT.captures(text) {
            Some(captures) => Ok(Self {
                amount: captures["amount"].split_whitespace().collect(),
                unit: normalize_unit(&captures["unit"]),
            }),
            None => Ok(Self {
                amount: text.to_owned(),
                unit: String::new(),
            }),
        }
    }

    pub fn is_percentage(&self) -> bool {
        self.unit == "%"
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() || self.is_percentage() {
            write!(f, "{}{}", self.amount, self.unit)
        } else {
            write!(f, "{} {}", self.amount, self.unit)
        }
    }
}

/// A primary amount, optionally with the same amount in another unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measure {
    pub primary: Quantity,
    pub alternate: Option<Quantity>,
}

impl Measure {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some((primary, alternate)) = text.split_once(';') {
            return Self::from_parts(primary, alternate);
        }
        if let Some(captures) = PARENTHESISED.captures(text) {
            return Self::from_parts(&captures["outer"], &captures["inner"]);
        }
        Ok(Self {
            primary: Quantity::parse(text)?,
            alternate: None,
        })
    }

    fn from_parts(primary: &str, alternate: &str) -> Result<Self> {
        let alternate = alternate.trim();
        Ok(Self {
            primary: Quantity::parse(primary)?,
            alternate: if alternate.is_empty() {
                None
            } else {
                Some(Quantity::parse(alternate)?)
            },
        })
    }

    /// What goes in the `notes` column next to the primary pair.
    pub fn notes(&self) -> Option<String> {
        self.alternate.as_ref().map(Quantity::to_string)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(alternate) = &self.alternate {
            write!(f, " ({alternate})")?;
        }
        Ok(())
    }
}

#[test]
fn percentage_with_weight() {
    let m = Measure::parse("40%; 12g").unwrap();
    assert_eq!(m.primary, Quantity::new("40", "%"));
    assert_eq!(m.alternate, Some(Quantity::new("12", "g")));
    assert_eq!(m.notes().as_deref(), Some("12 g"));
    assert_eq!(m.to_string(), "40% (12 g)");

    let m = Measure::parse("1%; 0.3g").unwrap();
    assert_eq!(m.primary, Quantity::new("1", "%"));
    assert_eq!(m.alternate, Some(Quantity::new("0.3", "g")));
}

#[test]
fn volume_with_metric_equivalent() {
    let m = Measure::parse("1 cup (240 mL)").unwrap();
    assert_eq!(m.primary, Quantity::new("1", "cup"));
    assert_eq!(m.alternate, Some(Quantity::new("240", "ml")));

    let m = Measure::parse("2 tablespoons (30 mL)").unwrap();
    assert_eq!(m.primary, Quantity::new("2", "tbsp"));
}

#[test]
fn plain_amounts() {
    let cases = [
        ("1/2 cup", "1/2", "cup"),
        ("10-15 drops", "10-15", "drops"),
        ("0.3g", "0.3", "g"),
        ("2 bags", "2", "bags"),
        ("1 teaspoon", "1", "tsp"),
        ("3 Grams", "3", "g"),
        ("1 / 4 cups", "1/4", "cup"),
        ("5 sprigs", "5", "sprigs"),
        ("pinch", "pinch", ""),
        ("12", "12", ""),
    ];
    for (text, amount, unit) in cases {
        let m = Measure::parse(text).unwrap();
        assert_eq!(m.primary, Quantity::new(amount, unit), "parsing {text:?}");
        assert_eq!(m.alternate, None);
    }
    assert!(Quantity::parse("  ").is_err());
}

#[test]
fn canonical_pairs_survive_display_and_parse() {
    let pairs = [
        Quantity::new("40", "%"),
        Quantity::new("1/2", "cup"),
        Quantity::new("10-15", "drops"),
        Quantity::new("pinch", ""),
        Quantity::new("12", ""),
        Quantity::new("0.3", "g"),
    ];
    for q in pairs {
        assert_eq!(Quantity::parse(&q.to_string()).unwrap(), q);
    }
    assert_eq!(Quantity::new("40", "%").to_string(), "40%");
    assert_eq!(Quantity::new("2", "tbsp").to_string(), "2 tbsp");
}
