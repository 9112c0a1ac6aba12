//! Script execution.
//!
//! [`executor`] defines the [`ScriptExecutor`] seam and its error type,
//! [`subprocess`] spawns a child and streams its output line by line into a
//! [`ProcessOutput`](crate::service_messages::output::ProcessOutput), and
//! [`powershell`] wraps a target script in a generated bootstrap before
//! handing it to the interpreter.

pub mod executor;
pub mod powershell;
pub mod subprocess;

pub use executor::{ScriptError, ScriptExecutor, ScriptOutcome};
pub use powershell::PowerShellExecutor;
