//! Executor interface and shared types.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapError;
use crate::service_messages::output::ProcessOutput;
use crate::variables::VariableStore;

/// Result of a script run that reached completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ScriptOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors that stop a script from running to completion.
///
/// A non-zero exit code is not an error; it is reported through
/// [`ScriptOutcome::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Script type '{0}' is not supported")]
    UnsupportedScriptType(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Runs a script with a variable set, streaming its output into `output`.
pub trait ScriptExecutor: Send + Sync {
    fn execute<O: ProcessOutput + Send>(
        &self,
        script: &Path,
        variables: &VariableStore,
        output: &mut O,
    ) -> impl Future<Output = Result<ScriptOutcome, ScriptError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
