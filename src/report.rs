// Copyright 2023 Remi Bernotavicius

//! JSON and Markdown artifacts for the diagnose and smoke commands.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The human readable side of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub title: String,
    pub lines: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Summary {
    pub fn render(&self, generated_at: DateTime<Utc>) -> String {
        let mut md = format!("# {}\n\n_Generated {}_\n\n## Summary\n\n", self.title, generated_at.to_rfc3339());
        for line in &self.lines {
            md.push_str(&format!("- {line}\n"));
        }
        md.push_str("\n## Recommendations\n\n");
        if self.recommendations.is_empty() {
            md.push_str("None.\n");
        }
        for (n, recommendation) in self.recommendations.iter().enumerate() {
            md.push_str(&format!("{}. {recommendation}\n", n + 1));
        }
        md
    }
}

pub trait Report: Serialize {
    /// Names the sub-directory and the file prefix, e.g. `diagnose`.
    fn kind(&self) -> &'static str;

    fn summary(&self) -> Summary;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReport {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, report: &impl Report, now: DateTime<Utc>) -> Result<WrittenReport> {
        let kind = report.kind();
        let dir = self.dir.join(kind);
        fs::create_dir_all(&dir)?;

        let stem = format!("{kind}-{}", now.format("%Y%m%dT%H%M%SZ"));
        let json = dir.join(format!("{stem}.json"));
        let markdown = dir.join(format!("{stem}.md"));

        fs::write(&json, serde_json::to_string_pretty(report)?)?;
        fs::write(&markdown, report.summary().render(now))?;
        log::info!("wrote {} and {}", json.display(), markdown.display());

        Ok(WrittenReport { json, markdown })
    }
}

#[cfg(test)]
#[derive(Serialize)]
struct AuditReport {
    checked: u32,
}

#[cfg(test)]
impl Report for AuditReport {
    fn kind(&self) -> &'static str {
        "audit"
    }

    fn summary(&self) -> Summary {
        Summary {
            title: "Audit".into(),
            lines: vec![format!("{} checked", self.checked)],
            recommendations: vec!["rotate the keys".into(), "run migrate".into()],
        }
    }
}

#[test]
fn writes_json_and_markdown_side_by_side() {
    use chrono::TimeZone as _;

    let tmp = tempfile::tempdir().unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
    let written = ReportWriter::new(tmp.path())
        .write(&AuditReport { checked: 3 }, now)
        .unwrap();

    assert_eq!(
        written.json,
        tmp.path().join("audit/audit-20240501T083000Z.json")
    );
    assert_eq!(
        written.markdown,
        tmp.path().join("audit/audit-20240501T083000Z.md")
    );

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&written.json).unwrap()).unwrap();
    assert_eq!(json, serde_json::json!({ "checked": 3 }));

    let markdown = fs::read_to_string(&written.markdown).unwrap();
    assert_eq!(
        markdown,
        "# Audit\n\n_Generated 2024-05-01T08:30:00+00:00_\n\n## Summary\n\n- 3 checked\n\n\
         ## Recommendations\n\n1. rotate the keys\n2. run migrate\n"
    );
}

#[test]
fn empty_recommendations() {
    let summary = Summary {
        title: "Quiet".into(),
        ..Default::default()
    };
    assert!(summary
        .render(Utc::now())
        .ends_with("## Recommendations\n\nNone.\n"));
}
