// scoutchat CLI — interactive chat, one-shot questions, proxy listing.

mod view;

use clap::{Parser, Subcommand};
use scoutchat::engine::transcript;
use scoutchat::{
    build_controller, AppConfig, ChatController, EngineError, ReasoningDetail, RetryAction,
    SettingsPatch, TurnOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use view::TerminalView;

#[derive(Parser)]
#[command(
    name = "scoutchat",
    version,
    about = "Chat with LLMs that can search, read pages and look things up"
)]
struct Cli {
    /// Config file (default: ~/.scoutchat/config.toml)
    #[arg(long, global = true, env = "SCOUTCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Model to use (gemini-* routes to Google, anything else to OpenAI-compatible)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Wait for whole responses instead of streaming
    #[arg(long, global = true)]
    no_stream: bool,

    /// Ask for step-by-step reasoning
    #[arg(long, global = true)]
    cot: bool,

    /// Verbose logging and raw model output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat,
    /// Ask one question and exit
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show the configured proxies in try-order
    Proxies,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.debug { "debug" } else { "warn" }),
    )
    .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, EngineError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.settings.selected_model = model.clone();
    }
    if cli.no_stream {
        config.settings.streaming = false;
    }
    if cli.cot {
        config.settings.enable_cot = true;
    }
    if cli.debug {
        config.settings.debug = true;
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Proxies => {
            print_proxies(&config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask { prompt } => {
            let view = Arc::new(TerminalView::new(true));
            let controller = build_controller(&config, view.clone())?;
            let outcome = controller.send_message(&prompt.join(" ")).await?;
            view.finish_pending();
            Ok(match outcome {
                TurnOutcome::Answered(_) => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Command::Chat => {
            let view = Arc::new(TerminalView::new(false));
            let controller = build_controller(&config, view.clone())?;
            repl(&controller, &view).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_proxies(config: &AppConfig) {
    println!(
        "Proxies (health scoring {}):",
        if config.tools.health_scoring { "on" } else { "off" }
    );
    for (i, status) in config.proxy_pool().status().iter().enumerate() {
        let Some(p) = config.tools.proxies.iter().find(|p| p.name == status.name) else { continue };
        let envelope = serde_json::to_value(p.envelope)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "  {}. {:<12} score {:>2}  {:<14} {}",
            i + 1,
            p.name,
            status.score,
            envelope,
            p.template
        );
    }
}

// ── REPL ───────────────────────────────────────────────────────────────

const HELP: &str = "\
Commands:
  /clear               start a new conversation
  /retry               retry every failed step of the last turn
  /set <key> <value>   streaming|cot|thinking|debug on/off, model <name>,
                       detail brief|standard|detailed
  /settings            show current settings
  /usage               show token usage for this conversation
  /save <path>         save the transcript (.html for HTML, JSON otherwise)
  /quit                exit";

async fn repl(controller: &ChatController, view: &TerminalView) -> Result<(), EngineError> {
    let settings = controller.settings();
    eprintln!("scoutchat — model {} (type /help for commands)", settings.selected_model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("» ");
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.splitn(3, char::is_whitespace);
            let name = parts.next().unwrap_or_default();
            let arg1 = parts.next().unwrap_or_default().trim();
            let arg2 = parts.next().unwrap_or_default().trim();
            match name {
                "quit" | "exit" | "q" => break,
                "help" => eprintln!("{}", HELP),
                "clear" => {
                    controller.clear_conversation()?;
                    eprintln!("Conversation cleared.");
                }
                "retry" => {
                    let mut actions = view.take_retries();
                    if actions.is_empty() {
                        actions.push(RetryAction::ResendTurn);
                    }
                    for action in actions {
                        report(controller.retry(action).await?);
                    }
                }
                "usage" => {
                    let u = controller.usage();
                    eprintln!(
                        "tokens this session: {} in, {} out, {} total",
                        u.input_tokens, u.output_tokens, u.total_tokens
                    );
                }
                "settings" => {
                    let s = controller.settings();
                    eprintln!(
                        "model={} streaming={} cot={} thinking={} detail={:?} debug={}",
                        s.selected_model,
                        s.streaming,
                        s.enable_cot,
                        s.show_thinking,
                        s.reasoning_detail_level,
                        s.debug
                    );
                }
                "set" => match settings_patch(arg1, arg2) {
                    Ok(patch) => {
                        controller.update_settings(patch);
                        eprintln!("ok");
                    }
                    Err(msg) => eprintln!("{}", msg),
                },
                "save" => {
                    if arg1.is_empty() {
                        eprintln!("usage: /save <path>");
                        continue;
                    }
                    let history = controller.history().await;
                    let model = controller.settings().selected_model;
                    match transcript::save(Path::new(arg1), &history, &model) {
                        Ok(()) => eprintln!("Saved {} messages to {}", history.len(), arg1),
                        Err(e) => eprintln!("Could not save: {}", e),
                    }
                }
                other => eprintln!("Unknown command /{} (try /help)", other),
            }
            continue;
        }

        report(controller.send_message(line).await?);
    }
    Ok(())
}

fn report(outcome: TurnOutcome) {
    match outcome {
        TurnOutcome::RoundLimit => log::info!("[cli] turn ended at the tool round limit"),
        TurnOutcome::Failed(reason) => log::info!("[cli] turn failed: {}", reason),
        _ => {}
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on/off, got '{}'", other)),
    }
}

fn settings_patch(key: &str, value: &str) -> Result<SettingsPatch, String> {
    let mut patch = SettingsPatch::default();
    match key {
        "streaming" => patch.streaming = Some(parse_switch(value)?),
        "cot" => patch.enable_cot = Some(parse_switch(value)?),
        "thinking" => patch.show_thinking = Some(parse_switch(value)?),
        "debug" => patch.debug = Some(parse_switch(value)?),
        "model" if !value.is_empty() => patch.selected_model = Some(value.to_string()),
        "detail" => patch.reasoning_detail_level = Some(value.parse::<ReasoningDetail>()?),
        _ => return Err("usage: /set <streaming|cot|thinking|debug|model|detail> <value>".into()),
    }
    Ok(patch)
}
