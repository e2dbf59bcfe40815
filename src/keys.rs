// Copyright 2023 Remi Bernotavicius

//! Checks on the configured API keys. The important one is catching a service-role key sitting in
//! the public anon variable, where the browser bundle would ship it to every visitor.

use crate::config::{self, Config};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone as _, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug)]
pub enum DecodeError {
    Segments(usize),
    Base64(base64::DecodeError),
    Json(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segments(n) => write!(f, "expected 3 dot-separated segments, found {n}"),
            Self::Base64(e) => write!(f, "payload is not base64url: {e}"),
            Self::Json(e) => write!(f, "payload is not JSON: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claims {
    pub role: Option<String>,
    #[serde(rename = "ref")]
    pub project_ref: Option<String>,
    pub iss: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp?, 0).single()
    }
}

/// Reads the payload of a JWT without verifying its signature; only the claims matter here.
pub fn decode_claims(jwt: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = jwt.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(DecodeError::Base64)?;
    serde_json::from_slice(&payload).map_err(DecodeError::Json)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Anon,
    ServiceRole,
    Authenticated,
    Publishable,
    Secret,
    Other(String),
    Undecodable(String),
}

impl KeyKind {
    /// Whether the key bypasses row-level security.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::ServiceRole | Self::Secret)
    }
}

pub fn classify_key(key: &str) -> (KeyKind, Option<Claims>) {
    let key = key.trim();
    if key.starts_with("sb_publishable_") {
        return (KeyKind::Publishable, None);
    }
    if key.starts_with("sb_secret_") {
        return (KeyKind::Secret, None);
    }
    match decode_claims(key) {
        Ok(claims) => {
            let kind = match claims.role.as_deref() {
                Some("anon") => KeyKind::Anon,
                Some("service_role") => KeyKind::ServiceRole,
                Some("authenticated") => KeyKind::Authenticated,
                Some(other) => KeyKind::Other(other.to_owned()),
                None => KeyKind::Other("none".into()),
            };
            (kind, Some(claims))
        }
        Err(e) => (KeyKind::Undecodable(e.to_string()), None),
    }
}

/// The project ref from a `https://<ref>.supabase.co` URL.
pub fn project_ref_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let project = host.strip_suffix(".supabase.co")?;
    (!project.is_empty() && !project.contains('.')).then(|| project.to_owned())
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[display("info")]
    Info,
    #[display("warning")]
    Warning,
    #[display("critical")]
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FindingCode {
    MissingVariable,
    InvalidUrl,
    AnonKeyIsServiceRole,
    AnonKeyUnexpectedRole,
    ServiceKeyNotServiceRole,
    KeyUndecodable,
    KeyExpired,
    ProjectRefMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: FindingCode,
    pub severity: Severity,
    pub variable: &'static str,
    pub message: String,
    pub remediation: String,
}

impl Finding {
    fn new(
        code: FindingCode,
        severity: Severity,
        variable: &'static str,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            code,
            severity,
            variable,
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

pub fn has_critical(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Critical)
}

fn check_missing(config: &Config, findings: &mut Vec<Finding>) {
    let required = [
        (config::SUPABASE_URL, config.supabase_url.is_some(), Severity::Critical),
        (config::ANON_KEY, config.anon_key.is_some(), Severity::Critical),
        (
            config::SERVICE_ROLE_KEY,
            config.service_role_key.is_some(),
            Severity::Warning,
        ),
        (
            config::DATABASE_URL,
            config.database_url.is_some(),
            Severity::Warning,
        ),
    ];
    for (variable, present, severity) in required {
        if !present {
            findings.push(Finding::new(
                FindingCode::MissingVariable,
                severity,
                variable,
                format!("{variable} is not set"),
                format!("add {variable} to .env.local"),
            ));
        }
    }
}

fn check_claims(
    variable: &'static str,
    claims: &Claims,
    expected_ref: Option<&str>,
    now: DateTime<Utc>,
    findings: &mut Vec<Finding>,
) {
    if let Some(expires_at) = claims.expires_at() {
        if expires_at < now {
            findings.push(Finding::new(
                FindingCode::KeyExpired,
                Severity::Critical,
                variable,
                format!("{variable} expired at {expires_at}"),
                "copy a current key from the project's API settings",
            ));
        }
    }
    if let (Some(expected), Some(actual)) = (expected_ref, claims.project_ref.as_deref()) {
        if expected != actual {
            findings.push(Finding::new(
                FindingCode::ProjectRefMismatch,
                Severity::Warning,
                variable,
                format!("{variable} belongs to project {actual:?} but the URL points at {expected:?}"),
                "make sure the URL and keys come from the same project",
            ));
        }
    }
}

pub fn diagnose(config: &Config, now: DateTime<Utc>) -> Vec<Finding> {
    let mut findings = vec![];
    check_missing(config, &mut findings);

    let mut expected_ref = None;
    if let Some(raw) = &config.supabase_url {
        match Url::parse(raw) {
            Ok(url) => expected_ref = project_ref_from_url(&url),
            Err(e) => findings.push(Finding::new(
                FindingCode::InvalidUrl,
                Severity::Critical,
                config::SUPABASE_URL,
                format!("{} is not a valid URL: {e}", config::SUPABASE_URL),
                "use the project URL, e.g. https://<ref>.supabase.co",
            )),
        }
    }

    if let Some(anon) = &config.anon_key {
        let (kind, claims) = classify_key(anon);
        match &kind {
            KeyKind::Anon | KeyKind::Publishable => {}
            KeyKind::ServiceRole | KeyKind::Secret => findings.push(Finding::new(
                FindingCode::AnonKeyIsServiceRole,
                Severity::Critical,
                config::ANON_KEY,
                format!(
                    "{} holds a privileged key; it is bundled into client code and bypasses row level security",
                    config::ANON_KEY
                ),
                "replace it with the anon/public key and never expose the service role key to the browser",
            )),
            KeyKind::Undecodable(reason) => findings.push(Finding::new(
                FindingCode::KeyUndecodable,
                Severity::Warning,
                config::ANON_KEY,
                format!("{} could not be decoded: {reason}", config::ANON_KEY),
                "check the value was copied completely",
            )),
            KeyKind::Authenticated | KeyKind::Other(_) => findings.push(Finding::new(
                FindingCode::AnonKeyUnexpectedRole,
                Severity::Warning,
                config::ANON_KEY,
                format!("{} has unexpected kind {kind:?}", config::ANON_KEY),
                "use the anon/public key from the project's API settings",
            )),
        }
        if let Some(claims) = claims {
            check_claims(config::ANON_KEY, &claims, expected_ref.as_deref(), now, &mut findings);
        }
    }

    if let Some(service) = &config.service_role_key {
        let (kind, claims) = classify_key(service);
        match &kind {
            kind if kind.is_privileged() => {}
            KeyKind::Undecodable(reason) => findings.push(Finding::new(
                FindingCode::KeyUndecodable,
                Severity::Warning,
                config::SERVICE_ROLE_KEY,
                format!("{} could not be decoded: {reason}", config::SERVICE_ROLE_KEY),
                "check the value was copied completely",
            )),
            _ => findings.push(Finding::new(
                FindingCode::ServiceKeyNotServiceRole,
                Severity::Warning,
                config::SERVICE_ROLE_KEY,
                format!(
                    "{} is a {kind:?} key; admin commands will be limited by row level security",
                    config::SERVICE_ROLE_KEY
                ),
                "copy the service_role key from the project's API settings",
            )),
        }
        if let Some(claims) = claims {
            check_claims(
                config::SERVICE_ROLE_KEY,
                &claims,
                expected_ref.as_deref(),
                now,
                &mut findings,
            );
        }
    }

    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    findings
}

#[cfg(test)]
fn fake_jwt(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

#[cfg(test)]
fn project_config(anon: Option<String>, service: Option<String>) -> Config {
    Config {
        supabase_url: Some("https://bzudglfxxywugesncjnz.supabase.co".into()),
        anon_key: anon,
        service_role_key: service,
        database_url: Some("postgres://localhost/diy".into()),
        ..Default::default()
    }
}

#[cfg(test)]
fn jan_2025() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

#[test]
fn decodes_supabase_claims() {
    let jwt = fake_jwt(serde_json::json!({
        "iss": "supabase",
        "ref": "bzudglfxxywugesncjnz",
        "role": "anon",
        "iat": 1686331448,
        "exp": 2001907448
    }));
    let claims = decode_claims(&jwt).unwrap();
    assert_eq!(claims.role.as_deref(), Some("anon"));
    assert_eq!(claims.project_ref.as_deref(), Some("bzudglfxxywugesncjnz"));
    assert_eq!(claims.expires_at().unwrap().timestamp(), 2001907448);

    assert!(matches!(decode_claims("abc.def"), Err(DecodeError::Segments(2))));
    assert!(matches!(decode_claims("a.!!!.c"), Err(DecodeError::Base64(_))));
}

#[test]
fn classifies_key_kinds() {
    let service = fake_jwt(serde_json::json!({ "role": "service_role" }));
    assert_eq!(classify_key(&service).0, KeyKind::ServiceRole);
    assert!(classify_key(&service).0.is_privileged());
    assert_eq!(classify_key("sb_publishable_abc").0, KeyKind::Publishable);
    assert_eq!(classify_key("sb_secret_abc").0, KeyKind::Secret);
    assert!(matches!(
        classify_key("not a key").0,
        KeyKind::Undecodable(_)
    ));
}

#[test]
fn service_role_in_anon_slot_is_critical() {
    let service = fake_jwt(serde_json::json!({ "role": "service_role", "ref": "bzudglfxxywugesncjnz" }));
    let config = project_config(Some(service.clone()), Some(service));

    let findings = diagnose(&config, jan_2025());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code, FindingCode::AnonKeyIsServiceRole);
    assert_eq!(findings[0].variable, config::ANON_KEY);
    assert!(has_critical(&findings));
    assert_eq!(findings[0].code.to_string(), "anon-key-is-service-role");
}

#[test]
fn healthy_configuration_has_no_findings() {
    let anon = fake_jwt(serde_json::json!({ "role": "anon", "ref": "bzudglfxxywugesncjnz", "exp": 2001907448 }));
    let service = fake_jwt(serde_json::json!({ "role": "service_role", "ref": "bzudglfxxywugesncjnz" }));
    assert_eq!(diagnose(&project_config(Some(anon), Some(service)), jan_2025()), vec![]);
}

#[test]
fn expiry_mismatch_and_missing_are_reported() {
    let anon = fake_jwt(serde_json::json!({ "role": "anon", "ref": "otherproject", "exp": 1700000000 }));
    let findings = diagnose(&project_config(Some(anon), None), jan_2025());
    let codes: Vec<FindingCode> = findings.iter().map(|f| f.code).collect();

    assert_eq!(findings[0].severity, Severity::Critical);
    assert!(codes.contains(&FindingCode::KeyExpired));
    assert!(codes.contains(&FindingCode::ProjectRefMismatch));
    assert!(codes.contains(&FindingCode::MissingVariable));
    let missing = findings
        .iter()
        .find(|f| f.code == FindingCode::MissingVariable)
        .unwrap();
    assert_eq!(missing.variable, config::SERVICE_ROLE_KEY);
    assert_eq!(missing.severity, Severity::Warning);
}

#[test]
fn anon_key_in_service_slot_is_a_warning() {
    let anon = fake_jwt(serde_json::json!({ "role": "anon" }));
    let findings = diagnose(&project_config(Some(anon.clone()), Some(anon)), jan_2025());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code, FindingCode::ServiceKeyNotServiceRole);
    assert!(!has_critical(&findings));
}

#[test]
fn project_ref_comes_from_the_host() {
    let url = Url::parse("https://bzudglfxxywugesncjnz.supabase.co").unwrap();
    assert_eq!(project_ref_from_url(&url).as_deref(), Some("bzudglfxxywugesncjnz"));
    let url = Url::parse("http://localhost:54321").unwrap();
    assert_eq!(project_ref_from_url(&url), None);
}
