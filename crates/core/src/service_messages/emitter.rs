//! Mode-tracking, thread-safe service message writer.
//!
//! The emitter owns both output channels behind one mutex. A mode switch
//! (`##octopus[stdout-<mode>]`) and the payload line that triggered it are
//! written under the same lock, so concurrent callers never interleave
//! between the marker and its line. Error lines go to the second channel
//! and do not touch the mode state.
//!
//! Instances are injected where needed rather than shared as globals; tests
//! build their own over in-memory buffers.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CreatedArtifact, DeltaVerification, FoundPackage, OutputMode, ServiceMessage};
use crate::variables::VariableStore;

const RED: &[u8] = b"\x1b[31m";
const RESET: &[u8] = b"\x1b[0m";

/// Emitter over the process's own stdout / stderr.
pub type StdEmitter = ServiceMessageEmitter<io::Stdout, io::Stderr>;

struct Channels<O, E> {
    mode: Option<OutputMode>,
    out: O,
    err: E,
}

pub struct ServiceMessageEmitter<O, E> {
    channels: Mutex<Channels<O, E>>,
    color_errors: bool,
}

impl<O: Write, E: Write> ServiceMessageEmitter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            channels: Mutex::new(Channels {
                mode: None,
                out,
                err,
            }),
            color_errors: false,
        }
    }

    /// Wrap error lines in a red foreground colour.
    pub fn with_color_errors(mut self, enabled: bool) -> Self {
        self.color_errors = enabled;
        self
    }

    /// The last mode announced on the output channel, `None` before the
    /// first emission.
    pub fn current_mode(&self) -> Option<OutputMode> {
        self.lock().mode
    }

    /// Write `line` at `mode`, announcing a mode change first if needed.
    pub fn emit(&self, mode: OutputMode, line: &str) -> io::Result<()> {
        let mut channels = self.lock();
        if channels.mode != Some(mode) {
            writeln!(channels.out, "{}", mode.marker_line())?;
            channels.mode = Some(mode);
        }
        writeln!(channels.out, "{line}")?;
        channels.out.flush()
    }

    pub fn emit_message(&self, mode: OutputMode, message: &ServiceMessage) -> io::Result<()> {
        self.emit(mode, &message.to_string())
    }

    pub fn verbose(&self, line: &str) -> io::Result<()> {
        self.emit(OutputMode::Verbose, line)
    }

    pub fn info(&self, line: &str) -> io::Result<()> {
        self.emit(OutputMode::Default, line)
    }

    pub fn warn(&self, line: &str) -> io::Result<()> {
        self.emit(OutputMode::Warning, line)
    }

    /// Write `line` to the error channel. Any colour applied is reset on
    /// every exit path, including a failed write.
    pub fn error(&self, line: &str) -> io::Result<()> {
        let mut channels = self.lock();
        let err = &mut channels.err;

        if self.color_errors {
            let colored = ColorGuard::apply(err, RED)?;
            writeln!(colored.writer, "{line}")?;
            colored.restore()
        } else {
            writeln!(err, "{line}")?;
            err.flush()
        }
    }

    // -----------------------------------------------------------------------
    // Protocol helpers
    // -----------------------------------------------------------------------

    /// Announce an output variable and, when given, record it locally too.
    pub fn set_output_variable(
        &self,
        name: &str,
        value: &str,
        variables: Option<&mut VariableStore>,
    ) -> io::Result<()> {
        self.emit_message(OutputMode::Default, &ServiceMessage::set_variable(name, value))?;
        if let Some(variables) = variables {
            variables.set(name, value);
        }
        Ok(())
    }

    pub fn package_found(
        &self,
        package: &FoundPackage,
        exact_match_exists: bool,
    ) -> io::Result<()> {
        if exact_match_exists {
            self.emit_message(OutputMode::Verbose, &ServiceMessage::ExactPackageMatch)?;
        }
        self.emit_message(OutputMode::Verbose, &ServiceMessage::FoundPackage(package.clone()))
    }

    pub fn delta_verification(&self, remote_path: &str, hash: &str, size: u64) -> io::Result<()> {
        let message = ServiceMessage::DeltaVerification(DeltaVerification {
            remote_path: remote_path.to_string(),
            hash: hash.to_string(),
            size,
        });
        self.emit_message(OutputMode::Verbose, &message)
    }

    pub fn create_artifact(&self, path: &str, name: &str, length: u64) -> io::Result<()> {
        let message = ServiceMessage::CreateArtifact(CreatedArtifact {
            path: path.to_string(),
            name: name.to_string(),
            length,
        });
        self.emit_message(OutputMode::Default, &message)
    }

    /// Consume the emitter and hand back its channels.
    pub fn into_inner(self) -> (O, E) {
        let channels = self
            .channels
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (channels.out, channels.err)
    }

    fn lock(&self) -> MutexGuard<'_, Channels<O, E>> {
        // A panic mid-write leaves at worst a partial line; keep going.
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Applies a terminal colour and resets it when dropped unless
/// [`restore`](Self::restore) already did.
struct ColorGuard<'a, W: Write> {
    writer: &'a mut W,
    restored: bool,
}

impl<'a, W: Write> ColorGuard<'a, W> {
    fn apply(writer: &'a mut W, color: &[u8]) -> io::Result<Self> {
        writer.write_all(color)?;
        Ok(Self {
            writer,
            restored: false,
        })
    }

    fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        self.writer.write_all(RESET)?;
        self.writer.flush()
    }
}

impl<W: Write> Drop for ColorGuard<'_, W> {
    fn drop(&mut self) {
        if !self.restored {
            let _ = self.writer.write_all(RESET);
            let _ = self.writer.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
