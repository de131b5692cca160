use anyhow::{Context, Result};
use clap::Args;

use crate::commands::{ClientArgs, read_prompt};
use crate::rchain::structured::AnswerWithJustification;

#[derive(Debug, Args, Clone)]
pub struct StructuredArgs {
    /// Question to answer. Read from stdin when omitted.
    pub prompt: Option<String>,
    #[command(flatten)]
    pub client: ClientArgs,
    #[arg(long)]
    pub blocking: bool,
    /// Print the answer and justification as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StructuredArgs) -> Result<()> {
    let prompt = read_prompt(args.prompt)?;
    let structured = args
        .client
        .client()?
        .with_structured_output::<AnswerWithJustification>();

    let answer = if args.blocking {
        tokio::task::spawn_blocking(move || structured.invoke(prompt))
            .await
            .context("blocking call panicked")??
    } else {
        structured.ainvoke(prompt).await?
    };

    if args.json {
        println!("{}", serde_json::to_string(&answer)?);
    } else {
        println!("answer: {}", answer.answer);
        println!("justification: {}", answer.justification);
    }
    Ok(())
}
