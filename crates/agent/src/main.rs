//! `stagehand-agent` -- runs deployment scripts for an orchestrator.
//!
//! Stdout carries script output and `##octopus[...]` service messages back
//! to the orchestrator, so diagnostics go to stderr only.
//!
//! # Environment variables
//!
//! | Variable                        | Required | Default | Description                        |
//! |---------------------------------|----------|---------|------------------------------------|
//! | `STAGEHAND_POWERSHELL_PATH`     | no       | `pwsh`  | PowerShell 7+ executable           |
//! | `STAGEHAND_SCRIPT_TIMEOUT_SECS` | no       | `3600`  | Wall-clock limit per script        |
//! | `STAGEHAND_COLOR_ERRORS`        | no       | `auto`  | `true` / `false` / `auto`          |
//! | `STAGEHAND_LOG_FORMAT`          | no       | `text`  | `text` or `json` diagnostics       |
//! | `RUST_LOG`                      | no       | `stagehand_agent=warn,stagehand_core=warn` | tracing filter |

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use stagehand_agent::cli::{Cli, Command};
use stagehand_agent::config::{AgentConfig, LogFormat};
use stagehand_agent::run_script::run_script;
use stagehand_core::bootstrap::BootstrapGenerator;
use stagehand_core::scripting::PowerShellExecutor;
use stagehand_core::service_messages::StdEmitter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AgentConfig::from_env().context("Invalid agent configuration")?;
    init_tracing(config.log_format);

    match cli.command {
        Command::RunScript(args) => {
            let config = args.apply_to(config);
            tracing::info!(
                script = %args.script.display(),
                powershell = %config.powershell_path.display(),
                timeout_secs = config.script_timeout.as_secs(),
                "Starting stagehand-agent",
            );

            let generator = BootstrapGenerator::with_new_session();
            let executor = PowerShellExecutor::new(config.powershell_path, generator)
                .with_timeout(config.script_timeout);
            let emitter = StdEmitter::new(std::io::stdout(), std::io::stderr())
                .with_color_errors(config.color_errors.enabled(std::io::stderr().is_terminal()));

            let report = run_script(&executor, &emitter, &args)
                .await
                .with_context(|| format!("Failed to run {}", args.script.display()))?;
            Ok(ExitCode::from(report.process_exit_code()))
        }
    }
}

fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagehand_agent=warn,stagehand_core=warn".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
