// Copyright 2023 Remi Bernotavicius

//! HTTP-level smoke checks against the running web app. Pages are fetched and searched for stable
//! `data-testid` hooks; a check is retried on a fixed interval until it passes or its deadline runs
//! out.

use crate::database::models::RecipeId;
use crate::report::{Report, Summary};
use crate::{Error, Result};
use backon::{BlockingRetryable as _, ConstantBuilder};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_PORTS: [u16; 2] = [3000, 3001];
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// The first port on localhost that accepts a connection, as a base URL.
pub fn detect_app_url(ports: &[u16], timeout: Duration) -> Option<String> {
    for &port in ports {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                log::info!("found the app on port {port}");
                return Some(format!("http://localhost:{port}"));
            }
            Err(e) => log::debug!("nothing on port {port}: {e}"),
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    Status(u16),
    Contains(String),
    TestId(String),
    ContentTypePrefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Expectation {
    fn test_id(id: &str) -> Self {
        Self::TestId(id.into())
    }

    /// `None` when the page meets the expectation, otherwise why not.
    pub fn check(&self, page: &Page) -> Option<String> {
        match self {
            Self::Status(status) => {
                (page.status != *status).then(|| format!("expected status {status}, got {}", page.status))
            }
            Self::Contains(text) => {
                (!page.body.contains(text.as_str())).then(|| format!("page does not contain {text:?}"))
            }
            Self::TestId(id) => (!page.body.contains(&format!("data-testid=\"{id}\"")))
                .then(|| format!("no element with data-testid {id:?}")),
            Self::ContentTypePrefix(prefix) => {
                let matches = page
                    .content_type
                    .as_deref()
                    .is_some_and(|ct| ct.starts_with(prefix.as_str()));
                (!matches).then(|| {
                    format!(
                        "expected content type {prefix}*, got {:?}",
                        page.content_type.as_deref().unwrap_or("none")
                    )
                })
            }
        }
    }
}

pub fn evaluate(expectations: &[Expectation], page: &Page) -> Vec<String> {
    expectations.iter().filter_map(|e| e.check(page)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeCheck {
    pub name: String,
    /// `None` when the check cannot run, with the reason in `skip`.
    pub path: Option<String>,
    pub expectations: Vec<Expectation>,
    pub skip: Option<String>,
}

impl SmokeCheck {
    pub fn new(name: &str, path: &str, expectations: Vec<Expectation>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            expectations,
            skip: None,
        }
    }

    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.into(),
            path: None,
            expectations: vec![],
            skip: Some(reason.into()),
        }
    }
}

pub fn default_suite(recipe: Option<RecipeId>) -> Vec<SmokeCheck> {
    let mut checks = vec![SmokeCheck::new(
        "home page lists recipes",
        "/",
        vec![
            Expectation::Status(200),
            Expectation::ContentTypePrefix("text/html".into()),
            Expectation::test_id("recipe-list"),
            Expectation::test_id("recipe-card"),
        ],
    )];

    const NO_RECIPE: &str = "no recipe id known; pass --recipe or seed the database";
    match recipe {
        Some(id) => {
            let path = format!("/document-view?id={id}");
            checks.push(SmokeCheck::new(
                "recipe document shows ingredients",
                &path,
                vec![
                    Expectation::Status(200),
                    Expectation::test_id("recipe-title"),
                    Expectation::test_id("ingredients-list"),
                    Expectation::test_id("ingredient-item"),
                ],
            ));
            checks.push(SmokeCheck::new(
                "recipe document shows iteration history",
                &path,
                vec![Expectation::Status(200), Expectation::test_id("iteration-history")],
            ));
        }
        None => {
            checks.push(SmokeCheck::skipped("recipe document shows ingredients", NO_RECIPE));
            checks.push(SmokeCheck::skipped(
                "recipe document shows iteration history",
                NO_RECIPE,
            ));
        }
    }

    checks.push(SmokeCheck::new(
        "simple document offers making mode",
        "/simple-doc",
        vec![
            Expectation::Status(200),
            Expectation::ContentTypePrefix("text/html".into()),
            Expectation::Contains("Making Mode".into()),
        ],
    ));
    checks.push(SmokeCheck::new(
        "settings shows theme and audio controls",
        "/settings",
        vec![
            Expectation::Status(200),
            Expectation::test_id("toggle-theme"),
            Expectation::test_id("toggle-audio"),
        ],
    ));
    checks.push(SmokeCheck::new(
        "terminal font is served",
        "/fonts/Share_Tech_Mono.woff",
        vec![
            Expectation::Status(200),
            Expectation::ContentTypePrefix("font/".into()),
        ],
    ));
    checks
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { reasons: Vec<String> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub url: Option<String>,
    pub attempts: usize,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
}

impl SmokeReport {
    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

impl Report for SmokeReport {
    fn kind(&self) -> &'static str {
        "smoke"
    }

    fn summary(&self) -> Summary {
        let mut lines = vec![format!(
            "{} against {}: {} passed, {} failed, {} skipped",
            self.started_at.to_rfc3339(),
            self.base_url,
            self.passed(),
            self.failed(),
            self.skipped()
        )];
        let mut recommendations = vec![];
        for result in &self.results {
            match &result.outcome {
                Outcome::Passed => lines.push(format!("PASS {}", result.name)),
                Outcome::Skipped { reason } => {
                    lines.push(format!("SKIP {} ({reason})", result.name))
                }
                Outcome::Failed { reasons } => {
                    lines.push(format!("FAIL {}: {}", result.name, reasons.join("; ")));
                    recommendations.push(format!(
                        "{}: check {} renders the expected data-testid hooks",
                        result.name,
                        result.url.as_deref().unwrap_or("the page")
                    ));
                }
            }
        }
        Summary {
            title: "Smoke test report".into(),
            lines,
            recommendations,
        }
    }
}

pub struct SmokeRunner {
    base: Url,
    http: Client,
    timeout: Duration,
    interval: Duration,
}

impl SmokeRunner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("bad app URL {base_url:?}: {e}")))?;
        let http = Client::builder().timeout(timeout.max(CONNECT_TIMEOUT)).build()?;
        Ok(Self {
            base,
            http,
            timeout,
            interval: POLL_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn fetch(&self, url: &Url) -> std::result::Result<Page, Vec<String>> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|e| vec![format!("request failed: {e}")])?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .map_err(|e| vec![format!("reading body failed: {e}")])?;
        Ok(Page {
            status,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    pub fn run_check(&self, check: &SmokeCheck) -> CheckResult {
        let started = Instant::now();
        let Some(path) = &check.path else {
            return CheckResult {
                name: check.name.clone(),
                url: None,
                attempts: 0,
                elapsed_ms: 0,
                outcome: Outcome::Skipped {
                    reason: check.skip.clone().unwrap_or_default(),
                },
            };
        };
        let url = match self.base.join(path) {
            Ok(url) => url,
            Err(e) => {
                return CheckResult {
                    name: check.name.clone(),
                    url: None,
                    attempts: 0,
                    elapsed_ms: 0,
                    outcome: Outcome::Failed {
                        reasons: vec![format!("bad path {path:?}: {e}")],
                    },
                }
            }
        };

        let deadline = started + self.timeout;
        let max_times = (self.timeout.as_millis() / self.interval.as_millis().max(1)) as usize;
        let mut attempts = 0;
        let result = (|| {
            attempts += 1;
            let page = self.fetch(&url)?;
            match evaluate(&check.expectations, &page) {
                reasons if reasons.is_empty() => Ok(()),
                reasons => Err(reasons),
            }
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(self.interval)
                .with_max_times(max_times),
        )
        .sleep(std::thread::sleep)
        .when(|_| Instant::now() + self.interval < deadline)
        .notify(|reasons: &Vec<String>, after: Duration| {
            log::debug!(
                "{}: {}, retrying in {}ms",
                check.name,
                reasons.join("; "),
                after.as_millis()
            )
        })
        .call();

        let outcome = match result {
            Ok(()) => {
                log::info!("PASS {}", check.name);
                Outcome::Passed
            }
            Err(reasons) => {
                log::warn!("FAIL {}: {}", check.name, reasons.join("; "));
                Outcome::Failed { reasons }
            }
        };
        CheckResult {
            name: check.name.clone(),
            url: Some(url.to_string()),
            attempts,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome,
        }
    }

    pub fn run_suite(&self, checks: &[SmokeCheck]) -> SmokeReport {
        let started_at = Utc::now();
        let results = checks.iter().map(|c| self.run_check(c)).collect();
        SmokeReport {
            base_url: self.base.to_string(),
            started_at,
            results,
        }
    }
}

#[test]
fn expectations_against_a_page() {
    let page = Page {
        status: 200,
        content_type: Some("text/html; charset=utf-8".into()),
        body: r#"<ul data-testid="recipe-list"><li data-testid="recipe-card">Beard Oil</li></ul>"#.into(),
    };
    assert!(evaluate(&default_suite(None)[0].expectations, &page).is_empty());

    let reasons = evaluate(
        &[
            Expectation::Status(404),
            Expectation::test_id("toggle-theme"),
            Expectation::Contains("Hand Cream".into()),
            Expectation::ContentTypePrefix("font/".into()),
        ],
        &page,
    );
    assert_eq!(
        reasons,
        [
            "expected status 404, got 200",
            "no element with data-testid \"toggle-theme\"",
            "page does not contain \"Hand Cream\"",
            "expected content type font/*, got \"text/html; charset=utf-8\"",
        ]
    );
}

#[test]
fn recipe_checks_are_skipped_without_an_id() {
    let suite = default_suite(None);
    let skipped: Vec<&str> = suite
        .iter()
        .filter(|c| c.path.is_none())
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(
        skipped,
        [
            "recipe document shows ingredients",
            "recipe document shows iteration history"
        ]
    );

    let id: RecipeId = "6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e".parse().unwrap();
    let suite = default_suite(Some(id));
    assert!(suite.iter().all(|c| c.path.is_some()));
    assert_eq!(
        suite[1].path.as_deref(),
        Some("/document-view?id=6f1c0a52-3b8e-4d8e-9a57-0f3b2a1c9d4e")
    );
}

#[test]
fn suite_passes_fails_and_skips() {
    use httpmock::Method::GET;
    use httpmock::MockServer;

    let server = MockServer::start();
    let html = [
        (
            "/",
            r#"<main data-testid="recipe-list"><a data-testid="recipe-card">Hair Rinse</a></main>"#,
        ),
        ("/simple-doc", r#"<button>Start Making Mode</button>"#),
        ("/settings", r#"<button data-testid="toggle-theme">theme</button>"#),
    ];
    let _pages: Vec<_> = html
        .iter()
        .map(|&(path, body)| {
            server.mock(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("Content-Type", "text/html; charset=utf-8")
                    .body(body);
            })
        })
        .collect();
    let _font = server.mock(|when, then| {
        when.method(GET).path("/fonts/Share_Tech_Mono.woff");
        then.status(200).header("Content-Type", "font/woff").body("wOFF");
    });

    let runner = SmokeRunner::new(&server.base_url(), Duration::ZERO).unwrap();
    let report = runner.run_suite(&default_suite(None));

    assert_eq!(report.passed(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 2);
    assert!(report.has_failures());

    let settings = &report.results[4];
    assert_eq!(settings.name, "settings shows theme and audio controls");
    assert_eq!(settings.attempts, 1);
    assert_eq!(
        settings.outcome,
        Outcome::Failed {
            reasons: vec!["no element with data-testid \"toggle-audio\"".into()]
        }
    );

    let summary = report.summary();
    assert!(summary
        .lines
        .contains(&"PASS simple document offers making mode".to_owned()));
    assert_eq!(summary.recommendations.len(), 1);

    let json = serde_json::to_value(&report.results[0]).unwrap();
    assert_eq!(json["outcome"], "passed");
}

#[test]
fn checks_keep_polling_until_the_deadline() {
    use httpmock::MockServer;

    let server = MockServer::start();
    let compiling = server.mock(|when, then| {
        when.path("/");
        then.status(500).body("compiling");
    });

    let runner = SmokeRunner::new(&server.base_url(), Duration::from_millis(300))
        .unwrap()
        .with_interval(Duration::from_millis(20));
    let result = runner.run_check(&default_suite(None)[0]);
    assert!(result.attempts > 1, "only {} attempt(s)", result.attempts);
    assert_eq!(compiling.hits(), result.attempts);
    match result.outcome {
        Outcome::Failed { reasons } => {
            assert!(reasons.contains(&"expected status 200, got 500".to_owned()))
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn detects_the_first_listening_port() {
    use std::net::TcpListener;

    let closed = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let open = listener.local_addr().unwrap().port();

    assert_eq!(
        detect_app_url(&[closed, open], CONNECT_TIMEOUT),
        Some(format!("http://localhost:{open}"))
    );
    assert_eq!(detect_app_url(&[closed], CONNECT_TIMEOUT), None);
}
