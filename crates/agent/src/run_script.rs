//! The `run-script` command.
//!
//! Loads the variable files, runs the target script through an executor
//! while relaying its output through the agent's emitter, and writes the
//! variables the script set to the output file when one is requested.

use std::io::Write;
use std::path::{Path, PathBuf};

use stagehand_core::scripting::{ScriptError, ScriptExecutor, ScriptOutcome};
use stagehand_core::service_messages::{
    EmitterRelay, ScriptResults, ServiceMessageEmitter, ServiceMessageOutput,
};
use stagehand_core::variables::{VariableError, VariableStore};

use crate::cli::RunScriptArgs;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to load variables: {0}")]
    Variables(#[source] VariableError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Failed to write output variables: {0}")]
    OutputVariables(#[source] VariableError),
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: ScriptOutcome,
    pub results: ScriptResults,
}

impl RunReport {
    /// The script's exit code as a process exit status. Codes outside
    /// `0..=255` become 1.
    pub fn process_exit_code(&self) -> u8 {
        u8::try_from(self.outcome.exit_code).unwrap_or(1)
    }
}

/// Plain files first, then sensitive ones; later files override earlier
/// entries of the same name.
pub fn load_variables(
    plain: &[PathBuf],
    sensitive: &[PathBuf],
) -> Result<VariableStore, VariableError> {
    let mut variables = VariableStore::new();
    for path in plain {
        variables.merge_json_file(path, false)?;
    }
    for path in sensitive {
        variables.merge_json_file(path, true)?;
    }
    tracing::debug!(
        count = variables.len(),
        sensitive = variables.iter().filter(|v| v.sensitive).count(),
        "Loaded variables",
    );
    Ok(variables)
}

pub async fn run_script<X, O, E>(
    executor: &X,
    emitter: &ServiceMessageEmitter<O, E>,
    args: &RunScriptArgs,
) -> Result<RunReport, RunError>
where
    X: ScriptExecutor,
    O: Write + Send,
    E: Write + Send,
{
    let variables =
        load_variables(&args.variables, &args.sensitive_variables).map_err(RunError::Variables)?;

    let mut output = ServiceMessageOutput::new(EmitterRelay::new(emitter));
    let outcome = executor.execute(&args.script, &variables, &mut output).await?;
    let (_, results) = output.into_parts();

    if let Some(path) = &args.output_variables {
        write_output_variables(path, &results)?;
    }

    if !outcome.succeeded() {
        tracing::warn!(exit_code = outcome.exit_code, "Script returned a non-zero exit code");
    }
    Ok(RunReport { outcome, results })
}

fn write_output_variables(path: &Path, results: &ScriptResults) -> Result<(), RunError> {
    results
        .variables
        .save_json_file(path)
        .map_err(RunError::OutputVariables)?;
    tracing::debug!(
        path = %path.display(),
        count = results.variables.len(),
        "Wrote output variables",
    );
    Ok(())
}
