// Copyright 2023 Remi Bernotavicius

//! Blocking client for the hosted database's REST surface (`<project>/rest/v1`).

use crate::config::SUPABASE_URL;
use crate::provision::{self, RpcStatus, TableStatus};
use crate::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UNDEFINED_COLUMN: &str = "42703";

/// An error body returned by PostgREST, plus the HTTP status it came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<serde_json::Value>,
    hint: Option<String>,
}

impl ApiError {
    pub fn from_parts(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                code: parsed.code,
                message: parsed
                    .message
                    .unwrap_or_else(|| format!("request failed with status {status}")),
                details: parsed.details.and_then(|d| match d {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                }),
                hint: parsed.hint,
            },
            Err(_) => Self {
                status,
                code: None,
                message: if body.trim().is_empty() {
                    format!("request failed with status {status}")
                } else {
                    body.trim().to_owned()
                },
                details: None,
                hint: None,
            },
        }
    }

    fn from_response(response: Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Self::from_parts(status, &body)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostgREST returned {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Reads the total from a `Content-Range` header such as `0-0/42` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

pub struct PostgrestClient {
    base: Url,
    http: Client,
}

impl PostgrestClient {
    pub fn new(supabase_url: &str, key: &str) -> Result<Self> {
        let base = Url::parse(&format!("{}/rest/v1/", supabase_url.trim_end_matches('/')))
            .map_err(|e| Error::Config(format!("{SUPABASE_URL} is not a valid URL: {e}")))?;

        let invalid_key = |_| Error::Config("API key contains characters not allowed in a header".into());
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid_key)?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("bad REST path {path:?}: {e}")))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_response(response).into())
        }
    }

    /// Asks for at most one row with an exact count. A missing relation is `Missing`; any other
    /// refusal (permissions, bad key, server trouble) is `Failed` and never mistaken for success.
    pub fn probe_table(&self, table: &str) -> Result<TableStatus> {
        provision::validate_identifier(table)?;
        let request = self
            .http
            .get(self.endpoint(table)?)
            .query(&[("select", "*"), ("limit", "1")])
            .header("Prefer", "count=exact");

        match self.send(request) {
            Ok(response) => {
                let rows = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range);
                Ok(TableStatus::Exists { rows })
            }
            Err(Error::Api(e)) => Ok(provision::classify_probe_failure(
                e.code.as_deref(),
                &e.to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        match self.probe_table(table)? {
            TableStatus::Exists { rows: Some(rows) } => Ok(rows),
            TableStatus::Exists { rows: None } | TableStatus::Incomplete { .. } => Err(Error::Config(format!(
                "no row count returned for {table}"
            ))),
            TableStatus::Missing => Err(Error::NotFound(format!("table {table}"))),
            TableStatus::Failed { reason } => Err(Error::Config(reason)),
        }
    }

    /// Whether a select naming exactly `columns` is accepted.
    fn selects(&self, table: &str, columns: &[&str]) -> Result<bool> {
        let request = self
            .http
            .get(self.endpoint(table)?)
            .query(&[("select", columns.join(",").as_str()), ("limit", "1")]);
        match self.send(request) {
            Ok(_) => Ok(true),
            Err(Error::Api(e)) if e.code.as_deref() == Some(UNDEFINED_COLUMN) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The subset of `columns` the table does not have. One request when all are present, then one
    /// per column to name the absent ones.
    pub fn missing_columns(&self, table: &str, columns: &[&str]) -> Result<Vec<String>> {
        provision::validate_identifier(table)?;
        if columns.is_empty() || self.selects(table, columns)? {
            return Ok(vec![]);
        }
        let mut missing = vec![];
        for &column in columns {
            if !self.selects(table, &[column])? {
                missing.push(column.to_owned());
            }
        }
        Ok(missing)
    }

    /// Calls a server-side function. Functions returning `void` come back as `Null`.
    pub fn rpc(&self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value> {
        provision::validate_identifier(name)?;
        let url = self.endpoint(&format!("rpc/{name}"))?;
        let body = self.send(self.http.post(url).json(args))?.text()?;
        if body.trim().is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    pub fn probe_rpc(&self, name: &str, args: &serde_json::Value) -> Result<RpcStatus> {
        match self.rpc(name, args) {
            Ok(_) => Ok(RpcStatus::Available),
            Err(Error::Api(e)) => Ok(provision::classify_rpc_failure(
                e.code.as_deref(),
                &e.to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

#[test]
fn api_error_from_postgrest_body() {
    let body = r#"{"code":"42P01","details":null,"hint":null,"message":"relation \"public.tools\" does not exist"}"#;
    let e = ApiError::from_parts(404, body);
    assert_eq!(e.code.as_deref(), Some("42P01"));
    assert_eq!(e.details, None);
    assert_eq!(
        e.to_string(),
        "PostgREST returned 404 [42P01]: relation \"public.tools\" does not exist"
    );

    let e = ApiError::from_parts(502, "<html>Bad Gateway</html>");
    assert_eq!(e.code, None);
    assert_eq!(e.message, "<html>Bad Gateway</html>");

    let e = ApiError::from_parts(500, "");
    assert_eq!(e.message, "request failed with status 500");
}

#[test]
fn content_range_totals() {
    assert_eq!(parse_content_range("0-0/42"), Some(42));
    assert_eq!(parse_content_range("*/0"), Some(0));
    assert_eq!(parse_content_range("0-9/*"), None);
    assert_eq!(parse_content_range("garbage"), None);
}

#[test]
fn table_status_distinguishes_missing_from_refused() {
    use httpmock::Method::GET;
    use httpmock::MockServer;

    let server = MockServer::start();
    let recipes = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/recipes")
            .query_param("select", "*")
            .query_param("limit", "1")
            .header("apikey", "anon-key")
            .header("authorization", "Bearer anon-key")
            .header("prefer", "count=exact");
        then.status(200).header("Content-Range", "0-0/6").body("[]");
    });
    let _tools = server.mock(|when, then| {
        when.method(GET).path("/rest/v1/tools");
        then.status(404).body(
            r#"{"code":"PGRST205","message":"Could not find the table 'public.tools' in the schema cache"}"#,
        );
    });
    let _preferences = server.mock(|when, then| {
        when.method(GET).path("/rest/v1/user_preferences");
        then.status(401)
            .body(r#"{"code":"42501","message":"permission denied for table user_preferences"}"#);
    });

    let client = PostgrestClient::new(&server.base_url(), "anon-key").unwrap();
    assert_eq!(
        client.probe_table("recipes").unwrap(),
        TableStatus::Exists { rows: Some(6) }
    );
    assert_eq!(client.probe_table("tools").unwrap(), TableStatus::Missing);
    assert!(matches!(
        client.probe_table("user_preferences").unwrap(),
        TableStatus::Failed { reason } if reason.contains("permission denied")
    ));
    assert_eq!(client.count_rows("recipes").unwrap(), 6);
    recipes.assert_hits(2);
}

#[test]
fn missing_columns_are_named() {
    use httpmock::MockServer;

    let server = MockServer::start();
    let undefined =
        r#"{"code":"42703","message":"column recipes.instructions does not exist"}"#;
    let together = server.mock(|when, then| {
        when.path("/rest/v1/recipes").query_param("select", "id,title,instructions");
        then.status(400).body(undefined);
    });
    let _present: Vec<_> = ["id", "title"]
        .iter()
        .map(|column| {
            server.mock(|when, then| {
                when.path("/rest/v1/recipes").query_param("select", *column);
                then.status(200).body("[]");
            })
        })
        .collect();
    let _absent = server.mock(|when, then| {
        when.path("/rest/v1/recipes").query_param("select", "instructions");
        then.status(400).body(undefined);
    });
    let _complete = server.mock(|when, then| {
        when.path("/rest/v1/ingredients").query_param("select", "id,name");
        then.status(200).body("[]");
    });
    let _refused = server.mock(|when, then| {
        when.path("/rest/v1/library");
        then.status(401).body(r#"{"code":"42501","message":"permission denied"}"#);
    });

    let client = PostgrestClient::new(&server.base_url(), "service-key").unwrap();
    assert_eq!(
        client
            .missing_columns("recipes", &["id", "title", "instructions"])
            .unwrap(),
        ["instructions"]
    );
    together.assert_hits(1);
    assert!(client
        .missing_columns("ingredients", &["id", "name"])
        .unwrap()
        .is_empty());
    assert!(matches!(
        client.missing_columns("library", &["id"]),
        Err(Error::Api(ApiError { status: 401, .. }))
    ));
}

#[test]
fn missing_rpc_function_is_reported() {
    use httpmock::Method::POST;
    use httpmock::MockServer;

    let server = MockServer::start();
    let exec_sql = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/rpc/exec_sql")
            .json_body(serde_json::json!({ "sql": "SELECT 1" }));
        then.status(204);
    });
    let _execute_sql = server.mock(|when, then| {
        when.method(POST).path("/rest/v1/rpc/execute_sql");
        then.status(404).body(
            r#"{"code":"PGRST202","message":"Could not find the function public.execute_sql(sql) in the schema cache"}"#,
        );
    });

    let client = PostgrestClient::new(&server.base_url(), "service-key").unwrap();
    let args = serde_json::json!({ "sql": "SELECT 1" });
    assert_eq!(client.probe_rpc("exec_sql", &args).unwrap(), RpcStatus::Available);
    assert_eq!(client.probe_rpc("execute_sql", &args).unwrap(), RpcStatus::Missing);
    exec_sql.assert_hits(1);
}

#[test]
fn table_names_are_validated_before_requests() {
    let client = PostgrestClient::new("http://127.0.0.1:9", "key").unwrap();
    assert!(matches!(
        client.probe_table("recipes?select=*"),
        Err(Error::InvalidIdentifier(_))
    ));
    assert!(matches!(
        client.missing_columns("Recipes", &["id"]),
        Err(Error::InvalidIdentifier(_))
    ));
}
