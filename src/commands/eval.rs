use std::io::{self, IsTerminal};

use anyhow::{Result, bail};
use clap::Args;
use tracing::info;

use crate::commands::ClientArgs;
use crate::eval::fixtures::SuiteName;
use crate::eval::metrics::Metric;
use crate::eval::model::ChatEvalModel;
use crate::eval::report::{render_json, render_text};
use crate::eval::runner::{EvalError, EvaluationResult, TestResult, assert_test, evaluate};

#[derive(Debug, Args, Clone)]
pub struct EvalArgs {
    /// Built-in suite to run.
    #[arg(long, required_unless_present = "list")]
    pub suite: Option<SuiteName>,
    /// List the built-in suites and exit.
    #[arg(long)]
    pub list: bool,
    /// Judge model selection.
    #[command(flatten)]
    pub judge: ClientArgs,
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub no_color: bool,
    /// Exit with an error when any test case fails.
    #[arg(long)]
    pub strict: bool,
}

pub async fn run(args: EvalArgs) -> Result<()> {
    if args.list {
        for name in SuiteName::ALL {
            let suite = name.suite();
            println!("{name}\t{} cases", suite.cases.len());
        }
        return Ok(());
    }
    let Some(name) = args.suite else {
        bail!("--suite is required");
    };

    let suite = name.suite();
    let judge = ChatEvalModel::from_client(args.judge.judge_client()?);
    let metrics = suite
        .metrics
        .iter()
        .map(|metric| metric as &dyn Metric)
        .collect::<Vec<_>>();
    info!(suite = %name, cases = suite.cases.len(), "running evaluation suite");

    let (result, assertion) = if suite.assert_style {
        let mut test_results = Vec::with_capacity(suite.cases.len());
        let mut assertion = None;
        for (index, case) in suite.cases.iter().enumerate() {
            match assert_test(case, &metrics, &judge).await {
                Ok(mut result) => {
                    result.name = case.label(index);
                    test_results.push(result);
                }
                Err(EvalError::AssertionFailed { metrics: data, .. }) => {
                    let failed = TestResult {
                        name: case.label(index),
                        success: false,
                        case: case.clone(),
                        metrics_data: data.clone(),
                    };
                    assertion.get_or_insert(EvalError::AssertionFailed {
                        case: failed.name.clone(),
                        metrics: data,
                    });
                    test_results.push(failed);
                }
                Err(err) => return Err(err.into()),
            }
        }
        (EvaluationResult { test_results }, assertion)
    } else {
        (evaluate(&suite.cases, &metrics, &judge).await?, None)
    };

    if args.json {
        println!("{}", render_json(&result)?);
    } else {
        let colored = !args.no_color && io::stdout().is_terminal();
        print!("{}", render_text(&result, colored));
    }

    if let Some(err) = assertion {
        return Err(err.into());
    }
    if args.strict && !result.all_passed() {
        let summary = result.summary();
        bail!("{} of {} test cases failed", summary.failed, summary.total);
    }
    Ok(())
}
