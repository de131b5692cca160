use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, ValueEnum};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::commands::{parse_key_value, read_prompt, save_output};
use crate::config::{self, ProfileConfig};
use crate::rchain::chat_models::{ChatOpenAI, ClientSettings, chat_payload};
use crate::rchain::messages::ChatRequest;
use crate::rchain::prompt::{PromptTemplate, PromptValues};
use crate::rchain::registry::{ClientOverrides, DEFAULT_CONFIG_NAME, ModelRegistry};
use crate::rchain::{AIMessage, Usage};

/// Template variable the prompt argument fills when `--var` does not.
const PROMPT_VARIABLE: &str = "question";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Text,
    Json,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported output mode '{other}'")),
        }
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct AskArgs {
    /// Prompt text. Read from stdin when omitted.
    pub prompt: Option<String>,
    /// Registry configuration to use (env: CF_MODEL).
    #[arg(short = 'm', long = "config-name")]
    pub config_name: Option<String>,
    /// Model identifier for dynamic configurations (env: CF_DYNAMIC_MODEL).
    #[arg(long)]
    pub dynamic_model: Option<String>,
    /// Profile from the config file.
    #[arg(long)]
    pub profile: Option<String>,
    /// System message prepended to the request.
    #[arg(long)]
    pub system: Option<String>,
    /// Prompt template with {name} placeholders.
    #[arg(long)]
    pub template: Option<String>,
    /// Template variable, repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Extra attempts for timeouts, 429 and 5xx responses.
    #[arg(long)]
    pub retries: Option<u32>,
    /// Base retry delay in milliseconds.
    #[arg(long)]
    pub retry_delay: Option<u64>,
    /// Print tokens as they arrive.
    #[arg(long)]
    pub stream: bool,
    /// Use the blocking client instead of the async one.
    #[arg(long)]
    pub blocking: bool,
    /// Print the request that would be sent and exit.
    #[arg(long)]
    pub dry_run: bool,
    /// Shorthand for --output json.
    #[arg(long)]
    pub json: bool,
    #[arg(long, value_enum)]
    pub output: Option<OutputMode>,
    /// Print token usage and latency on stderr.
    #[arg(long)]
    pub show_usage: bool,
    /// Also write the output to this file.
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
    #[arg(short, long)]
    pub verbose: bool,
    /// Suppress everything on stderr except fatal errors.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Options after applying CLI > `CF_*` environment > profile > default.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsk {
    pub config_name: String,
    pub system: Option<String>,
    pub overrides: ClientOverrides,
    pub output: OutputMode,
    pub show_usage: bool,
}

fn env_value<T, F>(lookup: &F, var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).map(|raw| raw.trim().to_string()) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| anyhow!("Invalid {var} '{raw}': {err}")),
    }
}

pub fn resolve_options<F>(args: &AskArgs, profile: &ProfileConfig, lookup: F) -> Result<ResolvedAsk>
where
    F: Fn(&str) -> Option<String>,
{
    let config_name = args
        .config_name
        .clone()
        .or(env_value(&lookup, "CF_MODEL")?)
        .or_else(|| profile.model.clone())
        .unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());

    let overrides = ClientOverrides {
        model: args
            .dynamic_model
            .clone()
            .or(env_value(&lookup, "CF_DYNAMIC_MODEL")?)
            .or_else(|| profile.dynamic_model.clone()),
        temperature: args
            .temperature
            .or(env_value(&lookup, "CF_TEMPERATURE")?)
            .or(profile.temperature),
        max_tokens: args
            .max_tokens
            .or(env_value(&lookup, "CF_MAX_TOKENS")?)
            .or(profile.max_tokens),
        timeout_secs: args
            .timeout
            .or(env_value(&lookup, "CF_TIMEOUT")?)
            .or(profile.timeout),
        retries: args
            .retries
            .or(env_value(&lookup, "CF_RETRIES")?)
            .or(profile.retries),
        retry_delay_ms: args
            .retry_delay
            .or(env_value(&lookup, "CF_RETRY_DELAY")?)
            .or(profile.retry_delay),
    };

    let profile_output = profile
        .output
        .as_deref()
        .map(<OutputMode as FromStr>::from_str)
        .transpose()
        .map_err(|err| anyhow!("Invalid profile output: {err}"))?;
    let output = if args.json {
        OutputMode::Json
    } else {
        args.output
            .or(env_value(&lookup, "CF_OUTPUT")?)
            .or(profile_output)
            .unwrap_or(OutputMode::Text)
    };

    Ok(ResolvedAsk {
        config_name,
        system: args.system.clone().or_else(|| profile.system.clone()),
        overrides,
        output,
        show_usage: args.show_usage || profile.show_usage.unwrap_or(false),
    })
}

/// Messages for the call: a rendered template or the raw prompt, plus the system message.
pub fn build_request(args: &AskArgs, system: Option<&str>) -> Result<ChatRequest> {
    let request = match &args.template {
        Some(text) => {
            let template = PromptTemplate::from_template(text).context("Invalid --template")?;
            let mut values = args.vars.iter().cloned().collect::<PromptValues>();
            let wants_prompt = template
                .input_variables()
                .iter()
                .any(|name| name == PROMPT_VARIABLE);
            if wants_prompt && !values.contains_key(PROMPT_VARIABLE) {
                values.insert(PROMPT_VARIABLE.to_string(), read_prompt(args.prompt.clone())?);
            } else if args.prompt.is_some() {
                warn!("prompt argument ignored: the template does not use {{{PROMPT_VARIABLE}}}");
            }
            template.render(&values)?
        }
        None => ChatRequest::from(read_prompt(args.prompt.clone())?),
    };
    Ok(match system {
        Some(system) => request.with_system(system),
        None => request,
    })
}

fn settings_for(overrides: &ClientOverrides) -> ClientSettings {
    let defaults = ClientSettings::default();
    ClientSettings {
        temperature: overrides.temperature.unwrap_or(defaults.temperature),
        max_tokens: overrides.max_tokens,
        timeout_secs: overrides.timeout_secs,
        retries: overrides.retries.unwrap_or(defaults.retries),
        retry_delay_ms: overrides.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
    }
}

pub async fn run(args: AskArgs) -> Result<()> {
    check_args(&args)?;
    let profile = match &args.profile {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };
    let resolved = resolve_options(&args, &profile, |var| env::var(var).ok())?;
    let registry = config::load_registry()?;
    let request = build_request(&args, resolved.system.as_deref())?;

    let config = registry.get(&resolved.config_name)?;
    let api_key_present = config.resolve_credential(|var| env::var(var).ok()).is_ok();
    let base_url = config.resolve_base_url(|var| env::var(var).ok())?;
    debug!(
        config = %config.name,
        base_url = %base_url,
        credential = %config.credential.describe(),
        api_key_present,
        stream = args.stream,
        blocking = args.blocking,
        "resolved ask options"
    );

    if args.dry_run {
        return dry_run(&args, &resolved, &registry, &request);
    }

    let client = registry.client(&resolved.config_name, &resolved.overrides)?;
    let started = Instant::now();
    let (content, message) = if args.stream {
        let echo = resolved.output == OutputMode::Text;
        let message = stream_answer(&args, client.clone(), request, echo).await?;
        (message.content.clone(), message)
    } else {
        let message = invoke_answer(&args, client.clone(), request).await?;
        (message.content.clone(), message)
    };
    let latency_ms = started.elapsed().as_millis();

    let rendered = match resolved.output {
        OutputMode::Text => {
            if !args.stream {
                println!("{content}");
            }
            content
        }
        OutputMode::Json => {
            let body = json!({
                "config": resolved.config_name,
                "model": client.model(),
                "content": message.content,
                "finish_reason": message.finish_reason,
                "usage": message.usage,
                "latency_ms": latency_ms,
            });
            let text = serde_json::to_string(&body)?;
            println!("{text}");
            text
        }
    };

    if let Some(path) = &args.save {
        save_output(path, &rendered)?;
    }
    if resolved.show_usage && !args.quiet {
        eprintln!("{}", usage_line(message.usage, latency_ms));
    }
    Ok(())
}

fn dry_run(
    args: &AskArgs,
    resolved: &ResolvedAsk,
    registry: &ModelRegistry,
    request: &ChatRequest,
) -> Result<()> {
    let config = registry.get(&resolved.config_name)?;
    let model = config.resolve_model(resolved.overrides.model.as_deref())?;
    let base_url = config.resolve_base_url(|var| env::var(var).ok())?;
    let settings = settings_for(&resolved.overrides);
    let body: Value = json!({
        "dry_run": true,
        "config": config.name,
        "model": model,
        "base_url": base_url,
        "messages": request.messages(),
        "request": chat_payload(&model, &settings, request, args.stream),
        "client": {
            "timeout_secs": settings.timeout_secs,
            "retries": settings.retries,
            "retry_delay_ms": settings.retry_delay_ms,
            "blocking": args.blocking,
        },
        "output": resolved.output,
    });
    let text = serde_json::to_string(&body)?;
    println!("{text}");
    if let Some(path) = &args.save {
        save_output(path, &text)?;
    }
    if resolved.show_usage && !args.quiet {
        eprintln!("usage: unavailable latency_ms=0 (dry-run)");
    }
    Ok(())
}

async fn invoke_answer(args: &AskArgs, client: ChatOpenAI, request: ChatRequest) -> Result<AIMessage> {
    if args.blocking {
        let message = tokio::task::spawn_blocking(move || client.invoke(request))
            .await
            .context("blocking call panicked")??;
        Ok(message)
    } else {
        Ok(client.ainvoke(request).await?)
    }
}

/// Streams tokens to stdout when `echo` is set; returns the full answer.
async fn stream_answer(
    args: &AskArgs,
    client: ChatOpenAI,
    request: ChatRequest,
    echo: bool,
) -> Result<AIMessage> {
    if args.blocking {
        let message = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut tokens = client.stream(request)?;
            let mut content = String::new();
            for token in tokens.by_ref() {
                let token = token?;
                if echo {
                    print_token(&token)?;
                }
                content.push_str(&token);
            }
            Ok(AIMessage {
                content,
                usage: tokens.usage(),
                finish_reason: tokens.finish_reason().map(str::to_string),
                ..AIMessage::default()
            })
        })
        .await
        .context("blocking stream panicked")??;
        if echo {
            println!();
        }
        return Ok(message);
    }

    let mut tokens = client.astream(request).await?;
    let mut content = String::new();
    while let Some(token) = tokens.next().await {
        let token = token?;
        if echo {
            print_token(&token)?;
        }
        content.push_str(&token);
    }
    if echo {
        println!();
    }
    Ok(AIMessage {
        content,
        usage: tokens.usage(),
        finish_reason: tokens.finish_reason().map(str::to_string),
        ..AIMessage::default()
    })
}

fn print_token(token: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(token.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn usage_line(usage: Option<Usage>, latency_ms: u128) -> String {
    match usage {
        Some(usage) => {
            let field = |value: Option<u32>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
            format!(
                "usage: prompt_tokens={} completion_tokens={} total_tokens={} latency_ms={latency_ms}",
                field(usage.prompt_tokens),
                field(usage.completion_tokens),
                field(usage.total_tokens),
            )
        }
        None => format!("usage: unavailable latency_ms={latency_ms}"),
    }
}

/// Rejects flag combinations before any config or network access.
pub fn check_args(args: &AskArgs) -> Result<()> {
    if args.template.is_none() && !args.vars.is_empty() {
        bail!("--var requires --template");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AskArgs, OutputMode, build_request, resolve_options, usage_line};
    use crate::config::ProfileConfig;
    use crate::rchain::Usage;
    use crate::rchain::messages::Role;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| {
            pairs
                .iter()
                .find(|(name, _)| *name == var)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn defaults_apply_without_flags_env_or_profile() {
        let resolved =
            resolve_options(&AskArgs::default(), &ProfileConfig::default(), env(&[])).expect("resolves");
        assert_eq!(resolved.config_name, "qwen-plus");
        assert_eq!(resolved.output, OutputMode::Text);
        assert_eq!(resolved.overrides.temperature, None);
        assert!(!resolved.show_usage);
    }

    #[test]
    fn cli_beats_env_beats_profile() {
        let profile = ProfileConfig {
            model: Some("kimi-k2".to_string()),
            temperature: Some(0.1),
            timeout: Some(7),
            max_tokens: Some(64),
            output: Some("json".to_string()),
            ..ProfileConfig::default()
        };
        let lookup = env(&[("CF_TEMPERATURE", "0.6"), ("CF_TIMEOUT", "21")]);
        let args = AskArgs {
            timeout: Some(33),
            output: Some(OutputMode::Text),
            ..AskArgs::default()
        };

        let resolved = resolve_options(&args, &profile, lookup).expect("resolves");
        assert_eq!(resolved.config_name, "kimi-k2");
        assert_eq!(resolved.overrides.temperature, Some(0.6));
        assert_eq!(resolved.overrides.timeout_secs, Some(33));
        assert_eq!(resolved.overrides.max_tokens, Some(64));
        assert_eq!(resolved.output, OutputMode::Text);
    }

    #[test]
    fn json_flag_wins_over_output_text() {
        let args = AskArgs {
            json: true,
            output: Some(OutputMode::Text),
            ..AskArgs::default()
        };
        let resolved =
            resolve_options(&args, &ProfileConfig::default(), env(&[])).expect("resolves");
        assert_eq!(resolved.output, OutputMode::Json);
    }

    #[test]
    fn malformed_env_values_are_reported() {
        let err = resolve_options(
            &AskArgs::default(),
            &ProfileConfig::default(),
            env(&[("CF_MAX_TOKENS", "lots")]),
        )
        .expect_err("bad env value");
        assert!(err.to_string().starts_with("Invalid CF_MAX_TOKENS 'lots'"));
    }

    #[test]
    fn template_renders_prompt_into_question() {
        let args = AskArgs {
            prompt: Some("2+2?".to_string()),
            template: Some("Q: {question}".to_string()),
            ..AskArgs::default()
        };
        let request = build_request(&args, Some("Be brief.")).expect("renders");
        let messages = request.messages();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Q: 2+2?");
    }

    #[test]
    fn template_vars_fill_other_placeholders() {
        let args = AskArgs {
            template: Some("Translate {text} into {lang}".to_string()),
            vars: vec![
                ("text".to_string(), "bonjour".to_string()),
                ("lang".to_string(), "English".to_string()),
            ],
            ..AskArgs::default()
        };
        let request = build_request(&args, None).expect("renders");
        assert_eq!(request.messages()[0].content, "Translate bonjour into English");
    }

    #[test]
    fn missing_template_variable_fails_before_any_call() {
        let args = AskArgs {
            template: Some("Translate {text}".to_string()),
            ..AskArgs::default()
        };
        let err = build_request(&args, None).expect_err("variable missing");
        assert!(format!("{err:#}").contains("text"));
    }

    #[test]
    fn usage_line_formats_counts_or_unavailable() {
        let usage = Usage {
            prompt_tokens: Some(3),
            completion_tokens: Some(5),
            total_tokens: None,
        };
        assert_eq!(
            usage_line(Some(usage), 12),
            "usage: prompt_tokens=3 completion_tokens=5 total_tokens=? latency_ms=12"
        );
        assert_eq!(usage_line(None, 4), "usage: unavailable latency_ms=4");
    }
}
