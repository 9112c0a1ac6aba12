//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::AgentConfig;

#[derive(Debug, Parser)]
#[command(
    name = "stagehand-agent",
    version,
    about = "Runs deployment scripts with injected variables"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a PowerShell script with variables injected through a bootstrap.
    RunScript(RunScriptArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunScriptArgs {
    /// Target script to run.
    #[arg(long)]
    pub script: PathBuf,

    /// JSON variables file. May be repeated; later files win.
    #[arg(long = "variables", value_name = "JSON")]
    pub variables: Vec<PathBuf>,

    /// JSON variables file whose entries are sensitive. May be repeated.
    #[arg(long = "sensitive-variables", value_name = "JSON")]
    pub sensitive_variables: Vec<PathBuf>,

    /// Where to write the variables the script set, as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub output_variables: Option<PathBuf>,

    /// PowerShell executable (overrides STAGEHAND_POWERSHELL_PATH).
    #[arg(long, value_name = "PATH")]
    pub powershell: Option<PathBuf>,

    /// Script timeout (overrides STAGEHAND_SCRIPT_TIMEOUT_SECS).
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,
}

impl RunScriptArgs {
    /// Apply command-line overrides on top of `config`.
    pub fn apply_to(&self, mut config: AgentConfig) -> AgentConfig {
        if let Some(path) = &self.powershell {
            config.powershell_path = path.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.script_timeout = Duration::from_secs(secs);
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
