use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::commands::ClientArgs;
use crate::rchain::messages::ChatRequest;

#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    /// Prompts sent as independent requests; answers keep this order.
    #[arg(required = true, num_args = 1..)]
    pub prompts: Vec<String>,
    #[command(flatten)]
    pub client: ClientArgs,
    #[arg(long)]
    pub system: Option<String>,
    /// Send the requests one after another with the blocking client.
    #[arg(long)]
    pub blocking: bool,
    /// Print one JSON array instead of numbered answers.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: BatchArgs) -> Result<()> {
    let client = args.client.client()?;
    let requests = args
        .prompts
        .iter()
        .map(|prompt| {
            let request = ChatRequest::from(prompt.as_str());
            match &args.system {
                Some(system) => request.with_system(system.clone()),
                None => request,
            }
        })
        .collect::<Vec<_>>();

    let answers = if args.blocking {
        tokio::task::spawn_blocking(move || client.batch(requests))
            .await
            .context("blocking batch panicked")??
    } else {
        client.abatch(requests).await?
    };

    if args.json {
        let body = args
            .prompts
            .iter()
            .zip(&answers)
            .map(|(prompt, answer)| json!({ "prompt": prompt, "content": answer.content }))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string(&body)?);
    } else {
        for (index, answer) in answers.iter().enumerate() {
            println!("[{}] {}", index + 1, answer.content);
        }
    }
    Ok(())
}
