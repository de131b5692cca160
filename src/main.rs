use std::io;
use std::process;

use chatforge::commands::LONG_VERSION;
use chatforge::commands::ask::{self, AskArgs};
use chatforge::commands::batch::{self, BatchArgs};
use chatforge::commands::config::{self, ConfigArgs};
use chatforge::commands::eval::{self, EvalArgs};
use chatforge::commands::models::{self, ModelsArgs};
use chatforge::commands::structured::{self, StructuredArgs};
use chatforge::telemetry::{Verbosity, init_tracing};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  chatforge ask \"2+2?\"\n  echo \"2+2?\" | chatforge ask -m kimi-k2 --stream\n  chatforge ask -m siliconflow --dynamic-model Qwen/Qwen3-8B --template \"Q: {question}\" \"2+2?\"\n  chatforge eval --suite arithmetic\n  chatforge models\n  chatforge completion bash > ~/.local/share/bash-completion/completions/chatforge";

const ASK_HELP_EXAMPLES: &str = "Examples:\n  chatforge ask \"2+2?\"\n  echo \"2+2?\" | chatforge ask -m openai --dynamic-model gpt-4o-mini\n  chatforge ask --template \"Translate {text} into {lang}\" --var text=bonjour --var lang=English\n  chatforge ask -m qwen-turbo --dry-run --json \"Explain retries\"";

#[derive(Debug, Parser)]
#[command(
    name = "chatforge",
    about = "Chat client and LLM-as-judge evaluation for OpenAI-compatible endpoints",
    version = LONG_VERSION,
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    /// Debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Suppress everything on stderr except fatal errors.
    #[arg(short, long)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(
        about = "Ask a question to a configured chat model",
        version = LONG_VERSION,
        after_help = ASK_HELP_EXAMPLES
    )]
    Ask(AskArgs),
    #[command(about = "Send several prompts and print the answers in order")]
    Batch(BatchArgs),
    #[command(about = "Ask for an answer with a justification, as structured output")]
    Structured(StructuredArgs),
    #[command(about = "Run a built-in LLM-as-judge evaluation suite")]
    Eval(EvalArgs),
    #[command(about = "List the configured chat models")]
    Models(ModelsArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "chatforge", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "chatforge", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "chatforge", &mut io::stdout()),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (verbose, quiet) = match &cli.command {
        Commands::Ask(args) => (cli.verbose || args.verbose, cli.quiet || args.quiet),
        _ => (cli.verbose, cli.quiet),
    };
    init_tracing(Verbosity::from_flags(verbose, quiet));

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Batch(args) => batch::run(args).await,
        Commands::Structured(args) => structured::run(args).await,
        Commands::Eval(args) => eval::run(args).await,
        Commands::Models(args) => models::run(args),
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
