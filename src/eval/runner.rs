use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::eval::metrics::{Metric, MetricData};
use crate::eval::model::EvalModel;
use crate::eval::test_case::TestCase;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("no test cases to evaluate")]
    NoTestCases,
    #[error("no metrics to evaluate with")]
    NoMetrics,
    #[error("assertion failed for {case}: {}", describe_failures(.metrics))]
    AssertionFailed {
        case: String,
        metrics: Vec<MetricData>,
    },
}

fn describe_failures(metrics: &[MetricData]) -> String {
    metrics
        .iter()
        .filter(|metric| !metric.success)
        .map(|metric| match &metric.error {
            Some(error) => format!("{} errored ({error})", metric.name),
            None => format!(
                "{} scored {:.2} (threshold {:.2})",
                metric.name, metric.score, metric.threshold
            ),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Metrics collected for one test case, in metric order.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub case: TestCase,
    pub metrics_data: Vec<MetricData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub test_results: Vec<TestResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    /// Mean of every metric score across all cases.
    pub average_score: f64,
}

impl EvaluationResult {
    pub fn all_passed(&self) -> bool {
        self.test_results.iter().all(|result| result.success)
    }

    pub fn summary(&self) -> EvaluationSummary {
        let total = self.test_results.len();
        let passed = self.test_results.iter().filter(|result| result.success).count();
        let scores = self
            .test_results
            .iter()
            .flat_map(|result| result.metrics_data.iter().map(|metric| metric.score))
            .collect::<Vec<_>>();
        let ratio = |part: f64, whole: usize| if whole == 0 { 0.0 } else { part / whole as f64 };

        EvaluationSummary {
            total,
            passed,
            failed: total - passed,
            pass_rate: ratio(passed as f64, total),
            average_score: ratio(scores.iter().sum(), scores.len()),
        }
    }
}

async fn run_case(
    index: usize,
    case: &TestCase,
    metrics: &[&dyn Metric],
    model: &dyn EvalModel,
) -> TestResult {
    let mut metrics_data = Vec::with_capacity(metrics.len());
    for metric in metrics {
        metrics_data.push(metric.measure(case, model).await);
    }
    let name = case.label(index);
    let success = metrics_data.iter().all(|data| data.success);
    info!(case = %name, success, "test case evaluated");
    TestResult {
        name,
        success,
        case: case.clone(),
        metrics_data,
    }
}

/// Scores every case with every metric, one judge request at a time.
#[instrument(skip_all, fields(cases = cases.len(), metrics = metrics.len(), model = model.model_name()))]
pub async fn evaluate(
    cases: &[TestCase],
    metrics: &[&dyn Metric],
    model: &dyn EvalModel,
) -> Result<EvaluationResult, EvalError> {
    if cases.is_empty() {
        return Err(EvalError::NoTestCases);
    }
    if metrics.is_empty() {
        return Err(EvalError::NoMetrics);
    }

    let mut test_results = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        test_results.push(run_case(index, case, metrics, model).await);
    }
    Ok(EvaluationResult { test_results })
}

/// Scores a single case and fails unless every metric passes.
pub async fn assert_test(
    case: &TestCase,
    metrics: &[&dyn Metric],
    model: &dyn EvalModel,
) -> Result<TestResult, EvalError> {
    if metrics.is_empty() {
        return Err(EvalError::NoMetrics);
    }
    let result = run_case(0, case, metrics, model).await;
    if result.success {
        Ok(result)
    } else {
        Err(EvalError::AssertionFailed {
            case: result.name,
            metrics: result.metrics_data,
        })
    }
}
