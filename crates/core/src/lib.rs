//! `stagehand-core` -- variable injection and service-message plumbing for
//! the deployment agent.
//!
//! The orchestrator hands the agent a [`VariableStore`](variables::VariableStore);
//! the [`bootstrap`] generator turns it into a PowerShell preamble that seeds
//! the target script, with sensitive values sealed by a per-session
//! [`SessionCipher`](cipher::SessionCipher). Results travel back on stdout as
//! `##octopus[...]` [`service_messages`].
//!
//! All of this is pure or synchronous. The only async code is the
//! [`scripting`] layer that spawns the interpreter.

pub mod bootstrap;
pub mod cipher;
pub mod encoding;
pub mod sanitize;
pub mod scripting;
pub mod service_messages;
pub mod special_variables;
pub mod variables;
