//! PowerShell bootstrap generation.
//!
//! [`BootstrapGenerator`] turns a [`VariableStore`] into a hidden wrapper
//! script placed next to the target script. The wrapper:
//!
//! 1. fills the case-insensitive `$OctopusParameters` table. Plain values are
//!    embedded as base64 decode expressions and sensitive values as
//!    `Decrypt-String` calls over ciphertext sealed by the session cipher;
//! 2. binds script-scope identifiers for every variable name (legacy and
//!    smart spellings, see [`crate::sanitize`]), each guarded so an identifier
//!    that is already populated is left alone;
//! 3. declares `Octopus.Script.Module[...]` variables as imported modules;
//! 4. dot-sources the target script.
//!
//! The session key never enters the file. It travels as the `-key` argument
//! built by [`BootstrapGenerator::command_arguments`].

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cipher::{CipherError, SessionCipher};
use crate::encoding::encode_value;
use crate::sanitize::{candidate_identifiers, sanitize_legacy};
use crate::special_variables::{
    is_excluded_from_local_variables, is_library_script_module, library_script_module_name,
};
use crate::variables::{Variable, VariableStore};

/// The wrapper template. `{{Name}}` slots are filled in a single pass.
const TEMPLATE: &str = include_str!("Bootstrap.ps1");

/// UTF-8 byte order mark; Windows PowerShell reads BOM-less files as ANSI.
const UTF8_BOM: &str = "\u{feff}";

/// Prefix of every generated file name. The leading dot hides it from
/// default directory listings.
pub const BOOTSTRAP_FILE_PREFIX: &str = ".Bootstrap.";

#[cfg(windows)]
const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

/// Fixed interpreter flags: no banner, no prompts, no profile, no policy.
pub const POWERSHELL_FLAGS: [&str; 5] = [
    "-NoLogo",
    "-NonInteractive",
    "-NoProfile",
    "-ExecutionPolicy",
    "Bypass",
];

/// Bootstrap generation errors. All are fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Target script path has no file name: {0}")]
    InvalidTargetPath(String),

    #[error("Failed to resolve target script path {path}: {source}")]
    Resolve {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write bootstrap script {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encrypt sensitive variable: {0}")]
    Cipher(#[from] CipherError),
}

/// Generates bootstrap scripts for one session key.
///
/// Safe to share across threads: the cipher is read-only and the module
/// counter is atomic.
#[derive(Debug)]
pub struct BootstrapGenerator {
    cipher: SessionCipher,
    module_counter: AtomicU64,
}

impl BootstrapGenerator {
    pub fn new(cipher: SessionCipher) -> Self {
        Self {
            cipher,
            module_counter: AtomicU64::new(0),
        }
    }

    /// A generator with freshly generated key material.
    pub fn with_new_session() -> Self {
        Self::new(SessionCipher::generate())
    }

    pub fn cipher(&self) -> &SessionCipher {
        &self.cipher
    }

    /// Write the bootstrap for `target_script` into the script's directory
    /// and return its path. Each call uses a fresh file name.
    pub fn prepare(
        &self,
        target_script: &Path,
        variables: &VariableStore,
    ) -> Result<PathBuf, BootstrapError> {
        let target = std::path::absolute(target_script).map_err(|source| {
            BootstrapError::Resolve {
                path: target_script.display().to_string(),
                source,
            }
        })?;
        let bootstrap_file = bootstrap_path_for(&target)?;
        let script = self.render(&target, variables)?;

        let mut contents = String::with_capacity(UTF8_BOM.len() + script.len() + 1);
        contents.push_str(UTF8_BOM);
        contents.push_str(&script);
        contents.push('\n');

        write_hidden(&bootstrap_file, contents.as_bytes()).map_err(|source| {
            BootstrapError::Write {
                path: bootstrap_file.display().to_string(),
                source,
            }
        })?;

        tracing::debug!(
            bootstrap = %bootstrap_file.display(),
            target = %target.display(),
            variable_count = variables.len(),
            "Wrote bootstrap script",
        );
        Ok(bootstrap_file)
    }

    /// Render the bootstrap text without touching the filesystem.
    pub fn render(
        &self,
        target_script: &Path,
        variables: &VariableStore,
    ) -> Result<String, BootstrapError> {
        let target = escape_single_quoted(&target_script.display().to_string());
        let declarations = self.declare_variables(variables)?;
        let modules = self.declare_script_modules(variables);

        Ok(fill_template(TEMPLATE, |slot| match slot {
            "TargetScriptFile" => Some(target.as_str()),
            "VariableDeclarations" => Some(declarations.as_str()),
            "ScriptModules" => Some(modules.as_str()),
            _ => None,
        }))
    }

    /// Interpreter arguments that run `bootstrap_file` with the session key
    /// and propagate the script's `$LastExitCode`.
    pub fn command_arguments(&self, bootstrap_file: &Path) -> Vec<String> {
        let escaped = escape_single_quoted(&bootstrap_file.display().to_string());
        let command = format!(
            ". {{. '{escaped}' -key '{}'; if ((test-path variable:global:lastexitcode)) {{ exit $LastExitCode }}}}",
            self.cipher.expose_key(),
        );

        let mut args: Vec<String> = POWERSHELL_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push("-Command".to_string());
        args.push(command);
        args
    }

    // -----------------------------------------------------------------------
    // Variable declarations
    // -----------------------------------------------------------------------

    fn declare_variables(&self, variables: &VariableStore) -> Result<String, BootstrapError> {
        let mut output = String::new();
        self.write_parameter_table(variables, &mut output)?;
        // The session key is only needed by the table above; a variable
        // named `Key` must bind normally and never see it.
        output.push_str("Remove-Variable -Name key\n\n");
        write_local_variables(variables, &mut output);
        Ok(output)
    }

    fn write_parameter_table(
        &self,
        variables: &VariableStore,
        output: &mut String,
    ) -> Result<(), BootstrapError> {
        output.push_str(
            "$OctopusParameters = New-Object 'System.Collections.Generic.Dictionary[String,String]' (,[System.StringComparer]::OrdinalIgnoreCase)\n",
        );

        for variable in non_module_variables(variables) {
            let value = if variable.sensitive {
                self.encrypt_expression(variable.value.as_deref())?
            } else {
                decode_expression(variable.value.as_deref())
            };
            let _ = writeln!(
                output,
                "$OctopusParameters[{}] = {value}",
                decode_expression(Some(&variable.name)),
            );
        }
        Ok(())
    }

    fn encrypt_expression(&self, value: Option<&str>) -> Result<String, BootstrapError> {
        let Some(value) = value else {
            return Ok("$null".to_string());
        };
        let sealed = self.cipher.encrypt(value)?;
        // Typed for the `Dictionary[String,String]` insert.
        Ok(format!(
            "(Decrypt-String \"{}\" \"{}\") -as [string]",
            sealed.ciphertext_base64(),
            sealed.iv_base64(),
        ))
    }

    // -----------------------------------------------------------------------
    // Script modules
    // -----------------------------------------------------------------------

    fn declare_script_modules(&self, variables: &VariableStore) -> String {
        let mut output = String::new();
        for variable in variables.iter() {
            let Some(module_name) = library_script_module_name(&variable.name) else {
                continue;
            };
            let ordinal = self.module_counter.fetch_add(1, Ordering::Relaxed) + 1;
            let block_name = format!("Library_{}_{ordinal}", sanitize_legacy(module_name));

            let _ = writeln!(output, "New-Module -Name {block_name} -ScriptBlock {{");
            output.push_str(variable.value.as_deref().unwrap_or_default());
            output.push('\n');
            output.push_str("} | Import-Module\n\n");
        }
        output
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind each candidate identifier once, in store order. Later variables
/// whose identifier is already claimed are skipped; the runtime guard covers
/// identifiers the environment populated before the bootstrap ran.
fn write_local_variables(variables: &VariableStore, output: &mut String) {
    // PowerShell variable names are case-insensitive.
    let mut claimed: HashSet<String> = HashSet::new();

    for variable in non_module_variables(variables) {
        if is_excluded_from_local_variables(&variable.name) {
            continue;
        }
        for identifier in candidate_identifiers(&variable.name) {
            if !claimed.insert(identifier.to_lowercase()) {
                tracing::debug!(
                    identifier = %identifier,
                    variable = %variable.name,
                    "Identifier already bound by an earlier variable; skipping",
                );
                continue;
            }
            write_variable_assignment(output, &identifier, &variable.name);
        }
    }
}

fn write_variable_assignment(output: &mut String, identifier: &str, variable_name: &str) {
    let _ = writeln!(output, "if (-Not (test-path variable:global:{identifier})) {{");
    let _ = writeln!(
        output,
        "  ${identifier} = $OctopusParameters[{}]",
        decode_expression(Some(variable_name)),
    );
    output.push_str("}\n");
}

fn non_module_variables(variables: &VariableStore) -> impl Iterator<Item = &Variable> {
    variables
        .iter()
        .filter(|v| !is_library_script_module(&v.name))
}

/// PowerShell expression that yields `value` from its base64 form.
fn decode_expression(value: Option<&str>) -> String {
    match value {
        Some(value) => format!(
            "[System.Text.Encoding]::UTF8.GetString([Convert]::FromBase64String(\"{}\"))",
            encode_value(value),
        ),
        None => "$null".to_string(),
    }
}

/// Escape for a single-quoted PowerShell string literal.
fn escape_single_quoted(value: &str) -> String {
    value.replace('\'', "''")
}

/// Create `path` and write `contents`. On Windows the file also gets the
/// hidden attribute; elsewhere the dot prefix is what hides it.
fn write_hidden(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.attributes(FILE_ATTRIBUTE_HIDDEN);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.flush()
}

fn bootstrap_path_for(target: &Path) -> Result<PathBuf, BootstrapError> {
    let invalid = || BootstrapError::InvalidTargetPath(target.display().to_string());
    let file_name = target.file_name().ok_or_else(invalid)?;
    let parent = target.parent().ok_or_else(invalid)?;

    let name = format!(
        "{BOOTSTRAP_FILE_PREFIX}{}.{}",
        uuid::Uuid::new_v4().simple(),
        file_name.to_string_lossy(),
    );
    Ok(parent.join(name))
}

/// Replace every `{{Name}}` slot known to `lookup`. Substituted text is
/// never rescanned, so values may contain slot-like text safely.
fn fill_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        output.push_str(&rest[..start]);
        match lookup(&after_open[..end]) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
