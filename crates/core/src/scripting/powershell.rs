//! PowerShell executor.
//!
//! Writes a bootstrap next to the target script, runs the interpreter on it
//! from the script's directory and deletes the bootstrap afterwards, whether
//! the run succeeded, failed, timed out or was cancelled. Only `.ps1`
//! scripts are accepted. The bootstrap needs PowerShell 7 or later.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::executor::{ScriptError, ScriptExecutor, ScriptOutcome};
use super::subprocess;
use crate::bootstrap::BootstrapGenerator;
use crate::service_messages::output::ProcessOutput;
use crate::variables::VariableStore;

/// Interpreter used when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "pwsh";

/// Extension of the scripts this executor accepts.
pub const SCRIPT_EXTENSION: &str = "ps1";

/// Default wall-clock limit for one script (1 hour).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct PowerShellExecutor {
    executable: PathBuf,
    timeout: Duration,
    generator: BootstrapGenerator,
}

impl PowerShellExecutor {
    pub fn new(executable: impl Into<PathBuf>, generator: BootstrapGenerator) -> Self {
        Self {
            executable: executable.into(),
            timeout: DEFAULT_TIMEOUT,
            generator,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn generator(&self) -> &BootstrapGenerator {
        &self.generator
    }
}

impl ScriptExecutor for PowerShellExecutor {
    async fn execute<O: ProcessOutput + Send>(
        &self,
        script: &Path,
        variables: &VariableStore,
        output: &mut O,
    ) -> Result<ScriptOutcome, ScriptError> {
        let is_file = tokio::fs::metadata(script)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ScriptError::NotFound(script.display().to_string()));
        }

        if !is_powershell_script(script) {
            let extension = script
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(ScriptError::UnsupportedScriptType(extension));
        }

        let bootstrap = BootstrapFile(self.generator.prepare(script, variables)?);

        let mut cmd = Command::new(&self.executable);
        cmd.args(self.generator.command_arguments(&bootstrap.0));
        if let Some(dir) = bootstrap.0.parent() {
            cmd.current_dir(dir);
        }

        tracing::info!(
            script = %script.display(),
            executable = %self.executable.display(),
            variable_count = variables.len(),
            "Running PowerShell script",
        );
        let outcome = subprocess::run_command(&mut cmd, self.timeout, output).await?;
        tracing::info!(
            exit_code = outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "PowerShell script finished",
        );
        Ok(outcome)
    }
}

fn is_powershell_script(script: &Path) -> bool {
    script
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

/// Removes the generated bootstrap when dropped.
struct BootstrapFile(PathBuf);

impl Drop for BootstrapFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::debug!(bootstrap = %self.0.display(), "Removed bootstrap script"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                bootstrap = %self.0.display(),
                error = %e,
                "Failed to remove bootstrap script",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
