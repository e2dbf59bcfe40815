// Copyright 2023 Remi Bernotavicius

//! One pass over everything that commonly goes wrong with a project: missing or misplaced keys,
//! tables that were never created and a missing `exec_sql` helper.

use crate::config::{Config, VariablePresence};
use crate::keys::{self, Finding, Severity};
use crate::postgrest::PostgrestClient;
use crate::provision::{self, RpcStatus, TableReport, EXEC_SQL, REQUIRED_TABLES};
use crate::report::{Report, Summary};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcReport {
    pub function: String,
    pub status: RpcStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseReport {
    pub generated_at: DateTime<Utc>,
    pub variables: Vec<VariablePresence>,
    pub findings: Vec<Finding>,
    pub tables: Vec<TableReport>,
    pub functions: Vec<RpcReport>,
    /// Set when the REST surface could not be probed at all.
    pub rest_error: Option<String>,
}

impl DiagnoseReport {
    pub fn has_critical(&self) -> bool {
        keys::has_critical(&self.findings)
    }
}

fn probe_rest(client: &PostgrestClient) -> Result<(Vec<TableReport>, Vec<RpcReport>)> {
    let tables =
        provision::probe_tables(&REQUIRED_TABLES, |t| provision::rest_table_status(client, t));
    let status = client.probe_rpc(EXEC_SQL, &serde_json::json!({ "sql": "SELECT 1" }))?;
    let functions = vec![RpcReport {
        function: EXEC_SQL.into(),
        status,
    }];
    Ok((tables, functions))
}

pub fn run(config: &Config, now: DateTime<Utc>) -> DiagnoseReport {
    let findings = keys::diagnose(config, now);
    for finding in &findings {
        match finding.severity {
            Severity::Critical => log::error!("{}: {}", finding.code, finding.message),
            Severity::Warning => log::warn!("{}: {}", finding.code, finding.message),
            Severity::Info => log::info!("{}: {}", finding.code, finding.message),
        }
    }

    let probed = config
        .require_supabase_url()
        .and_then(|url| PostgrestClient::new(url, config.admin_key()?))
        .and_then(|client| probe_rest(&client));
    let (tables, functions, rest_error) = match probed {
        Ok((tables, functions)) => (tables, functions, None),
        Err(e) => {
            log::warn!("skipping REST probes: {e}");
            (vec![], vec![], Some(e.to_string()))
        }
    };

    DiagnoseReport {
        generated_at: now,
        variables: config.presence(),
        findings,
        tables,
        functions,
        rest_error,
    }
}

impl Report for DiagnoseReport {
    fn kind(&self) -> &'static str {
        "diagnose"
    }

    fn summary(&self) -> Summary {
        let mut lines = vec![];
        for variable in &self.variables {
            lines.push(format!(
                "{}: {}",
                variable.name,
                variable.value.as_deref().unwrap_or("not set")
            ));
        }
        for finding in &self.findings {
            lines.push(format!("[{}] {}: {}", finding.severity, finding.code, finding.message));
        }
        if let Some(e) = &self.rest_error {
            lines.push(format!("REST probes skipped: {e}"));
        }
        for table in &self.tables {
            lines.push(format!("table {}: {}", table.table, describe_table(&table.status)));
        }
        for function in &self.functions {
            lines.push(format!("function {}: {:?}", function.function, function.status));
        }

        let mut recommendations: Vec<String> =
            self.findings.iter().map(|f| f.remediation.clone()).collect();
        if self.tables.iter().any(|t| t.status.needs_schema()) {
            recommendations.push(
                "run `diy-recipes-admin migrate` to create or complete the missing tables".into(),
            );
        }
        if self
            .functions
            .iter()
            .any(|f| matches!(f.status, RpcStatus::Missing))
        {
            recommendations.push(format!(
                "install the {EXEC_SQL} function (migrate with a database URL) so REST provisioning works"
            ));
        }
        recommendations.dedup();

        Summary {
            title: "Supabase configuration diagnostics".into(),
            lines,
            recommendations,
        }
    }
}

fn describe_table(status: &provision::TableStatus) -> String {
    match status {
        provision::TableStatus::Exists { rows: Some(rows) } => format!("{rows} row(s)"),
        provision::TableStatus::Exists { rows: None } => "present".into(),
        provision::TableStatus::Incomplete { missing_columns } => {
            format!("missing columns {}", missing_columns.join(", "))
        }
        provision::TableStatus::Missing => "missing".into(),
        provision::TableStatus::Failed { reason } => format!("probe failed: {reason}"),
    }
}

#[test]
fn diagnose_without_any_configuration() {
    let report = run(&Config::default(), Utc::now());
    assert!(report.has_critical());
    assert!(report.tables.is_empty());
    assert!(report
        .rest_error
        .as_deref()
        .unwrap()
        .contains(crate::config::SUPABASE_URL));

    let summary = report.summary();
    assert!(summary
        .recommendations
        .iter()
        .any(|r| r.contains(crate::config::ANON_KEY)));
}

#[test]
fn diagnose_checks_tables_and_exec_sql() {
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;

    let server = MockServer::start();
    let exec_sql = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/rpc/exec_sql")
            .header("apikey", "sb_secret_test");
        then.status(204);
    });
    let _preferences = server.mock(|when, then| {
        when.method(GET).path("/rest/v1/user_preferences");
        then.status(404).body(
            r#"{"code":"42P01","message":"relation \"public.user_preferences\" does not exist"}"#,
        );
    });
    let _present: Vec<_> = REQUIRED_TABLES
        .iter()
        .filter(|&&table| table != "user_preferences")
        .map(|table| {
            server.mock(|when, then| {
                when.method(GET)
                    .path(format!("/rest/v1/{table}"))
                    .header("apikey", "sb_secret_test");
                then.status(200).header("Content-Range", "*/0").body("[]");
            })
        })
        .collect();
    let config = Config {
        supabase_url: Some(server.base_url()),
        anon_key: Some("sb_publishable_test".into()),
        service_role_key: Some("sb_secret_test".into()),
        database_url: Some("postgres://localhost/diy".into()),
        ..Default::default()
    };

    let report = run(&config, Utc::now());
    assert!(!report.has_critical(), "{:?}", report.findings);
    assert_eq!(report.rest_error, None);
    assert_eq!(report.tables.len(), REQUIRED_TABLES.len());
    let missing: Vec<&str> = report
        .tables
        .iter()
        .filter(|t| t.status.is_missing())
        .map(|t| t.table.as_str())
        .collect();
    assert_eq!(missing, ["user_preferences"]);
    assert_eq!(report.functions[0].status, RpcStatus::Available);
    exec_sql.assert_hits(1);

    let summary = report.summary();
    assert_eq!(
        summary.recommendations,
        ["run `diy-recipes-admin migrate` to create or complete the missing tables"]
    );
}

#[test]
fn incomplete_tables_are_described_by_their_missing_columns() {
    let report = DiagnoseReport {
        generated_at: Utc::now(),
        variables: vec![],
        findings: vec![],
        tables: vec![TableReport {
            table: "recipes".into(),
            status: provision::TableStatus::Incomplete {
                missing_columns: vec!["instructions".into(), "user_id".into()],
            },
        }],
        functions: vec![],
        rest_error: None,
    };
    let summary = report.summary();
    assert_eq!(
        summary.lines,
        ["table recipes: missing columns instructions, user_id"]
    );
    assert_eq!(summary.recommendations.len(), 1);
}
