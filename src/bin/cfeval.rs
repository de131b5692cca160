use std::process;

use chatforge::commands::LONG_VERSION;
use chatforge::commands::eval::{self, EvalArgs};
use chatforge::telemetry::{Verbosity, init_tracing};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "cfeval",
    about = "Run a built-in LLM-as-judge evaluation suite",
    version = LONG_VERSION
)]
struct Cli {
    #[command(flatten)]
    eval: EvalArgs,
    /// Debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Suppress everything on stderr except fatal errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(Verbosity::from_flags(cli.verbose, cli.quiet));

    if let Err(err) = eval::run(cli.eval).await {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
