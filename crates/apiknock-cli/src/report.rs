//! Rendering results for the terminal and as JSON

use apiknock_core::{Classification, ResultSet, Verdict, VerdictStatus};
use apiknock_runner::FireReport;

/// Human-readable run summary, failures and errors first.
#[must_use]
pub fn to_terminal(results: &ResultSet, verdict: &Verdict) -> String {
    let summary = results.summary();
    let mut lines = Vec::new();

    for (title, class) in [
        ("Failures", Classification::Failed),
        ("Errors", Classification::Error),
    ] {
        let matching: Vec<_> = results
            .outcomes
            .iter()
            .filter(|o| o.classification == class)
            .collect();
        if matching.is_empty() {
            continue;
        }
        lines.push(format!("{title} ({}):", matching.len()));
        for o in matching {
            let who = o.identity.as_deref().unwrap_or("-");
            lines.push(format!("  [{who}] {} -> {}", o.operation(), o.message));
        }
        lines.push(String::new());
    }

    let icon = if verdict.status == VerdictStatus::Pass {
        "PASS"
    } else {
        "FAIL"
    };
    lines.push(format!("{icon}: {}", verdict.reason));
    lines.push(format!(
        "  Requests: {} total, {} success, {} failed, {} error",
        summary.total_requests, summary.success, summary.failed, summary.error
    ));
    lines.push(format!("  Exit code: {}", verdict.exit_code));

    lines.join("\n")
}

/// JSON document: verdict, counters, then every outcome in order.
#[must_use]
pub fn to_json(results: &ResultSet, verdict: &Verdict) -> serde_json::Value {
    let report = results.report();
    serde_json::json!({
        "verdict": {
            "status": verdict.status.to_string(),
            "exit_code": verdict.exit_code,
            "reason": verdict.reason,
        },
        "summary": report.summary,
        "outcomes": report.outcomes,
    })
}

#[must_use]
pub fn fire_to_terminal(report: &FireReport) -> String {
    let mut lines: Vec<String> = report
        .responses
        .iter()
        .map(|r| format!("  {} -> {}", r.operation, r.status))
        .collect();
    lines.insert(0, format!("Fired {} requests:", report.total_requests));
    lines.join("\n")
}
