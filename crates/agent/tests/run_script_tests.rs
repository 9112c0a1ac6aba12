//! Integration tests for the `run-script` command.
//!
//! A scripted executor replays canned output so the relay, result
//! collection and output-variables file can be checked without an
//! installed PowerShell.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assert_matches::assert_matches;
use stagehand_agent::cli::RunScriptArgs;
use stagehand_agent::run_script::{load_variables, run_script, RunError, RunReport};
use stagehand_core::bootstrap::BootstrapGenerator;
use stagehand_core::scripting::{PowerShellExecutor, ScriptError, ScriptExecutor, ScriptOutcome};
use stagehand_core::service_messages::output::ProcessOutput;
use stagehand_core::service_messages::{ScriptResults, ServiceMessageEmitter};
use stagehand_core::variables::{VariableError, VariableStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedExecutor {
    stdout: Vec<&'static str>,
    stderr: Vec<&'static str>,
    exit_code: i32,
    received: Mutex<Option<VariableStore>>,
}

impl ScriptExecutor for ScriptedExecutor {
    async fn execute<O: ProcessOutput + Send>(
        &self,
        _script: &Path,
        variables: &VariableStore,
        output: &mut O,
    ) -> Result<ScriptOutcome, ScriptError> {
        *self.received.lock().unwrap() = Some(variables.clone());
        for line in &self.stdout {
            output.write_stdout(line)?;
        }
        for line in &self.stderr {
            output.write_stderr(line)?;
        }
        Ok(ScriptOutcome {
            exit_code: self.exit_code,
            duration_ms: 1,
        })
    }
}

fn args(script: &Path) -> RunScriptArgs {
    RunScriptArgs {
        script: script.to_path_buf(),
        variables: vec![],
        sensitive_variables: vec![],
        output_variables: None,
        powershell: None,
        timeout_secs: None,
    }
}

fn write_json(dir: &tempfile::TempDir, name: &str, json: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, json).expect("write json");
    path
}

fn report(exit_code: i32) -> RunReport {
    RunReport {
        outcome: ScriptOutcome {
            exit_code,
            duration_ms: 0,
        },
        results: ScriptResults::default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn sensitive_files_load_after_plain_files() {
    let dir = tempfile::tempdir().unwrap();
    let plain = write_json(&dir, "vars.json", r#"{"Password": "visible", "Env": "Prod"}"#);
    let secret = write_json(&dir, "secret.json", r#"{"password": "hidden", "Token": null}"#);

    let variables = load_variables(&[plain], &[secret]).unwrap();
    assert_eq!(variables.len(), 3);
    assert_eq!(variables.get("PASSWORD"), Some("hidden"));
    assert!(variables.is_sensitive("Password"));
    assert!(!variables.is_sensitive("Env"));
    assert!(variables.contains("Token"));
    assert_eq!(variables.get("Token"), None);
    assert_eq!(variables.names().collect::<Vec<_>>(), vec!["Password", "Env", "Token"]);
}

#[tokio::test]
async fn relays_output_and_writes_result_variables() {
    let dir = tempfile::tempdir().unwrap();
    let vars = write_json(&dir, "vars.json", r#"{"Environment": "Production"}"#);
    let out = dir.path().join("out.json");

    let executor = ScriptedExecutor {
        stdout: vec![
            "Deploying",
            "##octopus[setVariable name='Rm9v' value='QmFy']",
            "##octopus[stdout-warning]",
            "Disk nearly full",
        ],
        stderr: vec!["something failed"],
        ..Default::default()
    };
    let emitter = ServiceMessageEmitter::new(Vec::new(), Vec::new());
    let mut request = args(&dir.path().join("deploy.ps1"));
    request.variables = vec![vars];
    request.output_variables = Some(out.clone());

    let report = run_script(&executor, &emitter, &request).await.unwrap();
    assert_eq!(report.process_exit_code(), 0);
    assert_eq!(report.results.variables.get("Foo"), Some("Bar"));

    let received = executor.received.lock().unwrap().take().unwrap();
    assert_eq!(received.get("Environment"), Some("Production"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, serde_json::json!({"Foo": "Bar"}));

    let (stdout, stderr) = emitter.into_inner();
    assert_eq!(
        String::from_utf8(stdout).unwrap(),
        "##octopus[stdout-default]\n\
         Deploying\n\
         ##octopus[setVariable name='Rm9v' value='QmFy']\n\
         ##octopus[stdout-warning]\n\
         Disk nearly full\n"
    );
    assert_eq!(String::from_utf8(stderr).unwrap(), "something failed\n");
}

#[tokio::test]
async fn output_file_is_only_written_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor {
        stdout: vec!["##octopus[setVariable name='Rm9v' value='QmFy']"],
        ..Default::default()
    };
    let emitter = ServiceMessageEmitter::new(io::sink(), io::sink());

    run_script(&executor, &emitter, &args(&dir.path().join("deploy.ps1")))
        .await
        .unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn non_zero_exit_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor {
        exit_code: 3,
        ..Default::default()
    };
    let emitter = ServiceMessageEmitter::new(io::sink(), io::sink());

    let report = run_script(&executor, &emitter, &args(&dir.path().join("deploy.ps1")))
        .await
        .unwrap();
    assert_eq!(report.outcome.exit_code, 3);
    assert_eq!(report.process_exit_code(), 3);
}

#[test]
fn exit_codes_outside_byte_range_become_one() {
    assert_eq!(report(0).process_exit_code(), 0);
    assert_eq!(report(255).process_exit_code(), 255);
    assert_eq!(report(256).process_exit_code(), 1);
    assert_eq!(report(-1).process_exit_code(), 1);
}

#[tokio::test]
async fn missing_variables_file_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::default();
    let emitter = ServiceMessageEmitter::new(io::sink(), io::sink());
    let mut request = args(&dir.path().join("deploy.ps1"));
    request.variables = vec![dir.path().join("absent.json")];

    let result = run_script(&executor, &emitter, &request).await;
    assert_matches!(result, Err(RunError::Variables(VariableError::Read { .. })));
    assert!(executor.received.lock().unwrap().is_none());
}

#[tokio::test]
async fn missing_script_surfaces_executor_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = PowerShellExecutor::new("pwsh", BootstrapGenerator::with_new_session());
    let emitter = ServiceMessageEmitter::new(io::sink(), io::sink());

    let result = run_script(&executor, &emitter, &args(&dir.path().join("absent.ps1"))).await;
    assert_matches!(result, Err(RunError::Script(ScriptError::NotFound(_))));
}
