use std::fmt::Write as _;

use owo_colors::OwoColorize;

use crate::eval::metrics::MetricData;
use crate::eval::runner::{EvaluationResult, EvaluationSummary, TestResult};

const RULE: &str = "----------------------------------------";

/// Renders a human-readable report. `colored` toggles ANSI styling.
pub fn render_text(result: &EvaluationResult, colored: bool) -> String {
    let mut out = String::new();
    for test in &result.test_results {
        render_case(&mut out, test, colored);
    }
    render_summary(&mut out, &result.summary(), colored);
    out
}

pub fn render_json(result: &EvaluationResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&serde_json::json!({
        "summary": result.summary(),
        "test_results": result.test_results,
    }))
}

fn status(success: bool, colored: bool) -> String {
    match (success, colored) {
        (true, true) => "PASS".green().bold().to_string(),
        (false, true) => "FAIL".red().bold().to_string(),
        (true, false) => "PASS".to_string(),
        (false, false) => "FAIL".to_string(),
    }
}

fn render_case(out: &mut String, test: &TestResult, colored: bool) {
    let title = format!("Test case {}", test.name);
    let _ = writeln!(out, "{RULE}");
    if colored {
        let _ = writeln!(out, "{}  [{}]", title.bold(), status(test.success, true));
    } else {
        let _ = writeln!(out, "{title}  [{}]", status(test.success, false));
    }
    let _ = writeln!(out, "Input: {}", test.case.input);
    let _ = writeln!(out, "Actual output: {}", test.case.actual_output);
    if let Some(expected) = &test.case.expected_output {
        let _ = writeln!(out, "Expected output: {expected}");
    }
    for metric in &test.metrics_data {
        render_metric(out, metric, colored);
    }
}

fn render_metric(out: &mut String, metric: &MetricData, colored: bool) {
    let _ = writeln!(
        out,
        "  {} {}: {:.2}/1.0 (threshold {:.2})",
        status(metric.success, colored),
        metric.name,
        metric.score,
        metric.threshold
    );
    if let Some(reason) = &metric.reason {
        let _ = writeln!(out, "    reason: {reason}");
    }
    if let Some(error) = &metric.error {
        if colored {
            let _ = writeln!(out, "    error: {}", error.yellow());
        } else {
            let _ = writeln!(out, "    error: {error}");
        }
    }
}

fn render_summary(out: &mut String, summary: &EvaluationSummary, colored: bool) {
    let _ = writeln!(out, "{RULE}");
    let heading = "Summary";
    if colored {
        let _ = writeln!(out, "{}", heading.bold());
    } else {
        let _ = writeln!(out, "{heading}");
    }
    let _ = writeln!(out, "  total:         {}", summary.total);
    let _ = writeln!(out, "  passed:        {}", summary.passed);
    let _ = writeln!(out, "  failed:        {}", summary.failed);
    let _ = writeln!(out, "  pass rate:     {:.1}%", summary.pass_rate * 100.0);
    let _ = writeln!(out, "  average score: {:.2}", summary.average_score);
}

#[cfg(test)]
mod tests {
    use super::{render_json, render_text};
    use crate::eval::metrics::{MetricData, ScoreDirection};
    use crate::eval::runner::{EvaluationResult, TestResult};
    use crate::eval::test_case::TestCase;

    fn sample() -> EvaluationResult {
        EvaluationResult {
            test_results: vec![TestResult {
                name: "100001".to_string(),
                success: false,
                case: TestCase::new("1+1=?", "3").expected("2"),
                metrics_data: vec![MetricData {
                    name: "Correctness".to_string(),
                    score: 0.1,
                    threshold: 0.5,
                    direction: ScoreDirection::HigherIsBetter,
                    success: false,
                    reason: Some("1+1 is 2".to_string()),
                    error: None,
                    evaluation_model: "judge".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn plain_report_lists_scores_and_summary() {
        let text = render_text(&sample(), false);
        assert!(text.contains("Test case 100001  [FAIL]"));
        assert!(text.contains("Expected output: 2"));
        assert!(text.contains("FAIL Correctness: 0.10/1.0 (threshold 0.50)"));
        assert!(text.contains("reason: 1+1 is 2"));
        assert!(text.contains("pass rate:     0.0%"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn colored_report_uses_ansi_styles() {
        assert!(render_text(&sample(), true).contains('\u{1b}'));
    }

    #[test]
    fn json_report_carries_summary_and_cases() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&sample()).expect("serializes")).expect("valid json");
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["test_results"][0]["name"], "100001");
        assert_eq!(json["test_results"][0]["metrics_data"][0]["direction"], "higher_is_better");
    }
}
