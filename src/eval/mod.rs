//! LLM-as-judge evaluation of chat model outputs.

pub mod fixtures;
pub mod metrics;
pub mod model;
pub mod report;
pub mod runner;
pub mod test_case;

pub use fixtures::{Suite, SuiteName};
pub use metrics::{GEval, Metric, MetricData, ScoreDirection};
pub use model::{ChatEvalModel, EvalModel};
pub use runner::{EvalError, EvaluationResult, EvaluationSummary, TestResult, assert_test, evaluate};
pub use test_case::{TestCase, TestCaseParam};
