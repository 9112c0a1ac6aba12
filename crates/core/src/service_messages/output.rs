//! Consuming a script's output streams.
//!
//! The process runner pushes raw lines into a [`ProcessOutput`].
//! [`ServiceMessageOutput`] is the standard one: it decodes service messages
//! from stdout into [`ScriptResults`], tracks the `stdout-<mode>` markers,
//! and forwards everything else to a typed [`CommandOutput`] sink together
//! with the current mode. Lines are handled strictly in arrival order, so a
//! later `setVariable` for a name overrides an earlier one.

use std::io;

use super::emitter::ServiceMessageEmitter;
use super::parser::parse_line;
use super::{CreatedArtifact, DeltaVerification, FoundPackage, OutputMode, ServiceMessage};
use crate::variables::VariableStore;

/// Raw line stream from a child process.
pub trait ProcessOutput {
    fn write_stdout(&mut self, line: &str) -> io::Result<()>;
    fn write_stderr(&mut self, line: &str) -> io::Result<()>;
}

/// Typed sink for decoded output.
pub trait CommandOutput {
    /// An ordinary stdout line (or one that failed to decode).
    fn write_info(&mut self, mode: OutputMode, line: &str) -> io::Result<()>;

    /// A stderr line.
    fn write_error(&mut self, line: &str) -> io::Result<()>;

    /// A decoded, recognised service message other than a mode marker.
    fn service_message(&mut self, _mode: OutputMode, _message: &ServiceMessage) -> io::Result<()> {
        Ok(())
    }
}

/// Everything a script reported back through service messages.
#[derive(Debug, Clone, Default)]
pub struct ScriptResults {
    pub variables: VariableStore,
    pub packages: Vec<FoundPackage>,
    pub exact_package_match: bool,
    pub delta_verifications: Vec<DeltaVerification>,
    pub artifacts: Vec<CreatedArtifact>,
}

// ---------------------------------------------------------------------------
// ServiceMessageOutput
// ---------------------------------------------------------------------------

/// Decodes service messages from stdout and forwards the rest to `sink`.
pub struct ServiceMessageOutput<S> {
    sink: S,
    mode: OutputMode,
    results: ScriptResults,
}

impl<S: CommandOutput> ServiceMessageOutput<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            mode: OutputMode::Default,
            results: ScriptResults::default(),
        }
    }

    /// The mode announced by the last `stdout-<mode>` marker.
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn results(&self) -> &ScriptResults {
        &self.results
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (S, ScriptResults) {
        (self.sink, self.results)
    }

    fn apply(&mut self, line: &str, message: ServiceMessage) -> io::Result<()> {
        match &message {
            ServiceMessage::StdoutMode(mode) => {
                self.mode = *mode;
                return Ok(());
            }
            ServiceMessage::SetVariable { name, value } => {
                self.results.variables.set(name.as_str(), value.as_str());
            }
            ServiceMessage::FoundPackage(package) => self.results.packages.push(package.clone()),
            ServiceMessage::ExactPackageMatch => self.results.exact_package_match = true,
            ServiceMessage::DeltaVerification(verification) => {
                self.results.delta_verifications.push(verification.clone());
            }
            ServiceMessage::CreateArtifact(artifact) => {
                self.results.artifacts.push(artifact.clone());
            }
            ServiceMessage::Unknown(raw) => {
                tracing::debug!(
                    tag = %raw.tag,
                    "Unrecognised service message; forwarding as output",
                );
                return self.sink.write_info(self.mode, line);
            }
        }
        self.sink.service_message(self.mode, &message)
    }
}

impl<S: CommandOutput> ProcessOutput for ServiceMessageOutput<S> {
    fn write_stdout(&mut self, line: &str) -> io::Result<()> {
        match parse_line(line) {
            None => self.sink.write_info(self.mode, line),
            Some(Ok(message)) => self.apply(line, message),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Undecodable service message; forwarding as output");
                self.sink.write_info(self.mode, line)
            }
        }
    }

    fn write_stderr(&mut self, line: &str) -> io::Result<()> {
        self.sink.write_error(line)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// In-memory sink that records everything it receives.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    pub info: Vec<(OutputMode, String)>,
    pub errors: Vec<String>,
    pub messages: Vec<ServiceMessage>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_lines(&self) -> impl Iterator<Item = &str> {
        self.info.iter().map(|(_, line)| line.as_str())
    }

    pub fn contains_info(&self, needle: &str) -> bool {
        self.info_lines().any(|line| line.contains(needle))
    }
}

impl CommandOutput for CaptureOutput {
    fn write_info(&mut self, mode: OutputMode, line: &str) -> io::Result<()> {
        self.info.push((mode, line.to_string()));
        Ok(())
    }

    fn write_error(&mut self, line: &str) -> io::Result<()> {
        self.errors.push(line.to_string());
        Ok(())
    }

    fn service_message(&mut self, _mode: OutputMode, message: &ServiceMessage) -> io::Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}

/// Re-emits a child's output through this process's own emitter, so the
/// orchestrator sees it with the right modes and canonical message form.
pub struct EmitterRelay<'a, O, E> {
    emitter: &'a ServiceMessageEmitter<O, E>,
}

impl<'a, O: io::Write, E: io::Write> EmitterRelay<'a, O, E> {
    pub fn new(emitter: &'a ServiceMessageEmitter<O, E>) -> Self {
        Self { emitter }
    }
}

impl<O: io::Write, E: io::Write> CommandOutput for EmitterRelay<'_, O, E> {
    fn write_info(&mut self, mode: OutputMode, line: &str) -> io::Result<()> {
        self.emitter.emit(mode, line)
    }

    fn write_error(&mut self, line: &str) -> io::Result<()> {
        self.emitter.error(line)
    }

    fn service_message(&mut self, mode: OutputMode, message: &ServiceMessage) -> io::Result<()> {
        self.emitter.emit_message(mode, message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &[&str]) -> (CaptureOutput, ScriptResults) {
        let mut output = ServiceMessageOutput::new(CaptureOutput::new());
        for line in lines {
            output.write_stdout(line).unwrap();
        }
        output.into_parts()
    }

    #[test]
    fn set_variable_and_plain_line() {
        let (capture, results) = feed(&[
            "##octopus[setVariable name='Rm9v' value='QmFy']",
            "just some output",
        ]);
        assert_eq!(results.variables.get("Foo"), Some("Bar"));
        assert_eq!(
            capture.info,
            vec![(OutputMode::Default, "just some output".to_string())]
        );
        assert_eq!(capture.messages, vec![ServiceMessage::set_variable("Foo", "Bar")]);
    }

    #[test]
    fn later_set_variable_wins() {
        let (_, results) = feed(&[
            "##octopus[setVariable name='Rm9v' value='MQ==']",
            "##octopus[setVariable name='Zm9v' value='Mg==']",
        ]);
        assert_eq!(results.variables.len(), 1);
        assert_eq!(results.variables.get("FOO"), Some("2"));
    }

    #[test]
    fn mode_markers_are_tracked_not_forwarded() {
        let mut output = ServiceMessageOutput::new(CaptureOutput::new());
        output.write_stdout("before").unwrap();
        output.write_stdout("##octopus[stdout-warning]").unwrap();
        output.write_stdout("careful").unwrap();
        output.write_stdout("##octopus[stdout-verbose]").unwrap();
        output.write_stdout("chatty").unwrap();
        assert_eq!(output.mode(), OutputMode::Verbose);

        let (capture, _) = output.into_parts();
        assert_eq!(
            capture.info,
            vec![
                (OutputMode::Default, "before".to_string()),
                (OutputMode::Warning, "careful".to_string()),
                (OutputMode::Verbose, "chatty".to_string()),
            ]
        );
    }

    #[test]
    fn undecodable_lines_pass_through_and_parsing_continues() {
        let bad = "##octopus[setVariable name='Rm9v']";
        let (capture, results) = feed(&[
            bad,
            "##octopus[setVariable name='Rm9v' value='QmFy']",
        ]);
        assert!(capture.contains_info(bad));
        assert_eq!(results.variables.get("Foo"), Some("Bar"));
    }

    #[test]
    fn unknown_tags_pass_through_verbatim() {
        let line = "##octopus[progress percentage='NTA=']";
        let (capture, _) = feed(&[line]);
        assert_eq!(capture.info_lines().collect::<Vec<_>>(), vec![line]);
        assert!(capture.messages.is_empty());
    }

    #[test]
    fn records_packages_verifications_and_artifacts() {
        let (_, results) = feed(&[
            "##octopus[calamari-found-package]",
            "##octopus[foundPackage id='QWNtZQ==' version='MS4wLjA=' hash='aA==' remotePath='L3A=']",
            "##octopus[deltaVerification remotePath='L3A=' hash='aA==' size='NDI=']",
            "##octopus[createArtifact path='Li9zdWJkaXIvYW5vdGhlcmRpci9teWZpbGU=' name='bXlmaWxl' length='MA==']",
        ]);
        assert!(results.exact_package_match);
        assert_eq!(results.packages.len(), 1);
        assert_eq!(results.packages[0].id, "Acme");
        assert_eq!(results.packages[0].version, "1.0.0");
        assert_eq!(results.delta_verifications[0].size, 42);
        assert_eq!(results.artifacts[0].name, "myfile");
        assert_eq!(results.artifacts[0].length, 0);
    }

    #[test]
    fn stderr_goes_to_error_sink() {
        let mut output = ServiceMessageOutput::new(CaptureOutput::new());
        output
            .write_stderr("##octopus[setVariable name='Rm9v' value='QmFy']")
            .unwrap();
        assert!(output.results().variables.is_empty());
        assert_eq!(output.sink().errors.len(), 1);
    }

    #[test]
    fn relay_reemits_through_emitter() {
        let emitter = ServiceMessageEmitter::new(Vec::new(), Vec::new());
        {
            let mut output = ServiceMessageOutput::new(EmitterRelay::new(&emitter));
            output.write_stdout("##octopus[stdout-verbose]").unwrap();
            output.write_stdout("detail").unwrap();
            output
                .write_stdout(r#"##octopus[setVariable name="Rm9v" value="QmFy"]"#)
                .unwrap();
            output.write_stderr("oops").unwrap();
        }
        let (out, err) = emitter.into_inner();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "##octopus[stdout-verbose]\ndetail\n##octopus[setVariable name='Rm9v' value='QmFy']\n"
        );
        assert_eq!(String::from_utf8(err).unwrap(), "oops\n");
    }
}
