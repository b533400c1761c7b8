//! Human-readable run report.

use std::fmt::Write;

use promptcheck_core::{Outcome, SuiteResult, Verdict};

pub fn render_text(suite_name: &str, result: &SuiteResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Suite: {}", suite_name);
    let _ = writeln!(out, "{:-<60}", "");

    for verdict in &result.verdicts {
        render_verdict(&mut out, verdict);
    }

    let _ = writeln!(out, "{:-<60}", "");
    let _ = writeln!(
        out,
        "{} passed, {} failed, {} errored, {} total in {}",
        result.counts.passed,
        result.counts.failed,
        result.counts.errored,
        result.counts.total,
        humantime::format_duration(truncate_to_millis(result.duration)),
    );
    out
}

fn render_verdict(out: &mut String, verdict: &Verdict) {
    let label = match verdict.outcome() {
        Outcome::Passed => "PASS ",
        Outcome::Failed => "FAIL ",
        Outcome::Errored => "ERROR",
    };
    let _ = writeln!(
        out,
        "{} {} ({} attempt{}, {})",
        label,
        verdict.case_id,
        verdict.attempts,
        if verdict.attempts == 1 { "" } else { "s" },
        humantime::format_duration(truncate_to_millis(verdict.elapsed)),
    );

    if let Some(cause) = &verdict.failure {
        let _ = writeln!(out, "      {}", cause);
    }
    for result in verdict.failed_assertions() {
        let _ = writeln!(
            out,
            "      [{}] {}: {}",
            result.kind, result.assertion_id, result.diagnostic
        );
    }
}

fn truncate_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
