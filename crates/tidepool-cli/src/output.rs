//! Rendering of command results as tables or JSON

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::json;
use tidepool_connection::reaper::ReapDecision;
use tidepool_connection::{FlushReport, ServerConnectionLimit, ServerConnectionUsage};
use tidepool_core::{QueryResult, Value};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn decision_label(decision: &ReapDecision) -> String {
    match decision {
        ReapDecision::Skip => "skip".to_string(),
        ReapDecision::KillIdleSince {
            min_idle_secs,
            reason,
        } => format!("kill idle >= {}s ({})", min_idle_secs, reason),
    }
}

pub fn flush_report(report: &FlushReport, json: bool) -> anyhow::Result<String> {
    if json {
        let reap = report.reap.as_ref().map(|outcome| {
            json!({
                "limit": outcome.limit,
                "usage": outcome.usage,
                "decision": decision_label(&outcome.decision),
                "killed": outcome.killed,
                "failures": outcome
                    .failures
                    .iter()
                    .map(|f| json!({ "session_id": f.session_id, "error": f.error }))
                    .collect::<Vec<_>>(),
            })
        });
        let body = json!({ "disconnected": report.disconnected, "reap": reap });
        return Ok(serde_json::to_string_pretty(&body)?);
    }

    let mut table = table();
    table.add_row(vec!["idle disconnected".to_string(), report.disconnected.to_string()]);
    match &report.reap {
        None => {
            table.add_row(vec!["zombie cleanup".to_string(), "disabled".to_string()]);
        }
        Some(outcome) => {
            table.add_row(vec!["decision".to_string(), decision_label(&outcome.decision)]);
            table.add_row(vec![
                "killed".to_string(),
                format!("{} {:?}", outcome.killed_count(), outcome.killed),
            ]);
            for failure in &outcome.failures {
                table.add_row(vec![
                    format!("kill {} failed", failure.session_id),
                    failure.error.clone(),
                ]);
            }
        }
    }
    Ok(table.to_string())
}

pub fn server_usage(
    limit: &ServerConnectionLimit,
    usage: &ServerConnectionUsage,
    json: bool,
) -> anyhow::Result<String> {
    let utilization = usage.utilization(limit);
    if json {
        let body = json!({ "limit": limit, "usage": usage, "utilization": utilization });
        return Ok(serde_json::to_string_pretty(&body)?);
    }

    let scope = if limit.user_scoped { "per user" } else { "server" };
    let mut table = table();
    table.set_header(vec!["limit", "scope", "used", "utilization", "longest idle"]);
    table.add_row(vec![
        limit.total.to_string(),
        scope.to_string(),
        usage.used.to_string(),
        utilization
            .map(|u| format!("{:.1}%", u * 100.0))
            .unwrap_or_else(|| "n/a".to_string()),
        format!("{}s", usage.max_idle_secs),
    ]);
    Ok(table.to_string())
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => json!(v),
        Value::Int64(v) => json!(v),
        Value::UInt64(v) => json!(v),
        Value::Float64(v) => json!(v),
        Value::Json(v) => v.clone(),
        other => json!(other.to_string()),
    }
}

pub fn query_result(result: &QueryResult, json: bool) -> anyhow::Result<String> {
    if json {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = result
            .rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .cloned()
                    .zip(row.values.iter().map(value_to_json))
                    .collect()
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&rows)?);
    }

    if !result.has_rows() {
        return Ok(format!("(no rows) in {} ms", result.execution_time_ms));
    }

    let mut table = table();
    table.set_header(result.columns.clone());
    for row in &result.rows {
        table.add_row(row.values.iter().map(ToString::to_string).collect::<Vec<_>>());
    }
    Ok(format!(
        "{}\n{} row(s) in {} ms",
        table,
        result.row_count(),
        result.execution_time_ms
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_query_result_as_json_uses_plain_values() {
        let result = QueryResult::from_rows(
            vec!["id".into(), "user".into(), "note".into()],
            vec![vec![Value::UInt64(12), Value::from("app"), Value::Null]],
        );
        let rendered = query_result(&result, true).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, json!([{ "id": 12, "user": "app", "note": null }]));
    }

    #[test]
    fn test_query_result_table_lists_rows() {
        let result = QueryResult::from_rows(
            vec!["Id".into()],
            vec![vec![Value::UInt64(7)], vec![Value::UInt64(8)]],
        );
        let rendered = query_result(&result, false).unwrap();
        assert!(rendered.contains("Id"));
        assert!(rendered.ends_with("2 row(s) in 0 ms"));
    }

    #[test]
    fn test_flush_without_cleanup() {
        let report = FlushReport {
            disconnected: 3,
            reap: None,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&flush_report(&report, true).unwrap()).unwrap();
        assert_eq!(parsed, json!({ "disconnected": 3, "reap": null }));
        assert!(flush_report(&report, false).unwrap().contains("disabled"));
    }

    #[test]
    fn test_usage_reports_utilization() {
        let limit = ServerConnectionLimit {
            total: 100,
            user_scoped: false,
        };
        let usage = ServerConnectionUsage {
            used: 25,
            max_idle_secs: 40,
        };
        let rendered = server_usage(&limit, &usage, false).unwrap();
        assert!(rendered.contains("25.0%"));
        assert!(rendered.contains("40s"));
    }
}
