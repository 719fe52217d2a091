//! CLI entry point. Wires the env, provider, tool dispatcher, call log,
//! and task list into one [`claudec_api::ClaudeCApi`], then drives the
//! read → send → render loop.

mod history;
mod line_editor;
mod paste;
mod wrap;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use claudec_api::{Api, ClaudeCApi};
use claudec_app::{Orchestrator, ProviderClient, TodoWriteTool};
use claudec_domain::{AWSCredentials, BedrockConfig, ClaudeCEnv, InterruptBus, TaskList};
use claudec_infra::{CallLogStore, RotationPolicy};
use claudec_provider::{BedrockProvider, OpenAiCompatibleProvider, ToolDefinition};
use claudec_services::dispatcher::ToolDispatcher;
use claudec_services::tool::Tool;
use clap::Parser;
use colored::Colorize;
use line_editor::{InterruptWatcher, LineEditor, LineEditorConfig, RawModeGuard, ReadOutcome};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A single command that launches the agent loop.
#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive coding-agent CLI", long_about = None)]
struct Cli {
    /// Chat-completions-compatible base URL, used when not running against
    /// Bedrock.
    #[arg(long, env = "CLAUDE_C_BASE_URL", default_value = "https://api.openai.com")]
    base_url: String,

    /// API key for the OpenAI-compatible provider.
    #[arg(long, env = "CLAUDE_C_API_KEY", default_value = "")]
    api_key: String,

    /// Model id / name sent to the provider.
    #[arg(long, env = "CLAUDE_C_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Session identifier recorded on every call-log row. Defaults to a
    /// freshly generated id so every process invocation groups its own
    /// calls distinctly in the store.
    #[arg(long)]
    session_id: Option<String>,
}

/// Resolves the session id that gets stamped on every call-log row for this
/// process: the `--session-id` override if given, else a fresh v4 uuid.
fn resolve_session_id(cli: &Cli) -> String {
    cli.session_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn init_logging(env: &ClaudeCEnv) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = env.log_path();
    std::fs::create_dir_all(&log_dir).context("creating log directory")?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "claudec.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

fn builtin_tools(task_list: Arc<Mutex<TaskList>>) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(TodoWriteTool::new(task_list))]
}

fn tool_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters(),
        })
        .collect()
}

async fn build_provider(
    cli: &Cli,
    env: &ClaudeCEnv,
    tools: Vec<ToolDefinition>,
    interrupt: InterruptBus,
) -> Result<ProviderClient> {
    if !env.use_bedrock {
        return Ok(ProviderClient::OpenAiCompatible(OpenAiCompatibleProvider::new(
            cli.base_url.clone(),
            cli.api_key.clone(),
            cli.model.clone(),
            tools,
            interrupt,
        )));
    }

    let credentials = if let (Some(key), Some(secret)) =
        (&env.aws_access_key_id, &env.aws_secret_access_key)
    {
        let mut creds = AWSCredentials::new(key.clone(), secret.clone(), env.aws_region.clone())
            .with_profile(env.aws_profile.clone());
        if let Some(token) = &env.aws_session_token {
            creds = creds.with_session_token(token.clone());
        }
        creds
    } else {
        claudec_provider::credentials::load(&env.aws_profile, Some(&env.aws_region))
            .await
            .context("no AWS credentials available for Bedrock (checked env, aws CLI, SSO cache)")?
    };

    let config = BedrockConfig::new(env.aws_region.clone(), cli.model.clone(), credentials);
    Ok(ProviderClient::Bedrock(BedrockProvider::with_cache_enabled(
        config,
        tools,
        interrupt,
        !env.disable_prompt_caching,
    )))
}

fn render_turn(task_list: &Arc<Mutex<TaskList>>, outcome: &claudec_app::TurnOutcome) {
    for text in &outcome.assistant_texts {
        println!("{text}");
    }
    if outcome.task_list_touched {
        let guard = task_list.lock().expect("task list mutex poisoned");
        let colors = claudec_display::ColorConfig::new();
        print!("{}", claudec_display::render_task_list(&guard, &colors));
    }
    if outcome.interrupted {
        println!("{}", "[interrupted]".dimmed());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("claudec: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let env = ClaudeCEnv::from_std_env();
    let _log_guard = init_logging(&env)?;
    let session_id = resolve_session_id(&cli);

    tracing::info!(use_bedrock = env.use_bedrock, model = %cli.model, session_id = %session_id, "starting claudec");

    let task_list = Arc::new(Mutex::new(TaskList::new()));
    let interrupt = InterruptBus::new();
    let tools = builtin_tools(task_list.clone());
    let provider = build_provider(&cli, &env, tool_definitions(&tools), interrupt.clone())
        .await
        .context("failed to configure provider")?;

    let default_timeout = env.bash_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);
    let dispatcher = ToolDispatcher::new(tools, None, interrupt.clone(), default_timeout);

    let db_path: PathBuf = env.db_path();
    let call_log = CallLogStore::open(&db_path).context("opening call log store")?;
    let rotation_policy = RotationPolicy {
        auto_rotate: env.db_auto_rotate,
        max_days: env.db_max_days.unwrap_or(30),
        max_records: env.db_max_records.unwrap_or(1000),
        max_size_mb: env.db_max_size_mb.unwrap_or(100),
    };

    let orchestrator = Orchestrator::new(
        provider,
        dispatcher,
        call_log,
        rotation_policy,
        db_path,
        task_list.clone(),
        interrupt.clone(),
        Some(session_id),
    );
    let mut api: Box<dyn Api> = Box::new(ClaudeCApi::new(orchestrator));

    let _raw_mode = RawModeGuard::new().context("enabling raw terminal mode")?;
    let mut editor = LineEditor::new(LineEditorConfig::default());

    loop {
        let line = match editor.read_line() {
            Ok(ReadOutcome::Submitted(line)) if !line.trim().is_empty() => line,
            Ok(ReadOutcome::Submitted(_)) | Ok(ReadOutcome::Cancelled) => continue,
            Ok(ReadOutcome::Eof) => break,
            Err(e) => {
                tracing::error!(error = %e, "line editor read failed");
                break;
            }
        };

        let watcher = InterruptWatcher::spawn(interrupt.clone());
        let result = api.send(line).await;
        watcher.stop();

        match result {
            Ok(outcome) => render_turn(&task_list, &outcome),
            Err(e) => eprintln!("{}", format!("turn failed: {e:#}").red()),
        }
    }

    Ok(())
}
