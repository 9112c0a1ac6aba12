//! The `##octopus[...]` stdout side channel.
//!
//! One message per line:
//!
//! ```text
//! ##octopus[<tag> <key>='<base64>' <key>='<base64>' ...]
//! ```
//!
//! Field values are base64 of their UTF-8 bytes so arbitrary text, including
//! the quote and bracket delimiters, survives verbatim. [`RawServiceMessage`]
//! is the wire shape; [`ServiceMessage`] is the typed view with one variant
//! per known tag.

use std::fmt;

use crate::encoding::{encode_value, EncodingError};

pub mod emitter;
pub mod output;
pub mod parser;

pub use emitter::{ServiceMessageEmitter, StdEmitter};
pub use output::{
    CaptureOutput, CommandOutput, EmitterRelay, ProcessOutput, ScriptResults, ServiceMessageOutput,
};
pub use parser::parse_line;

/// Every service message line starts with this marker.
pub const MESSAGE_PREFIX: &str = "##octopus[";

/// Tag names of the recognised messages.
pub mod tags {
    pub const SET_VARIABLE: &str = "setVariable";
    pub const FOUND_PACKAGE: &str = "foundPackage";
    pub const EXACT_PACKAGE_MATCH: &str = "calamari-found-package";
    pub const DELTA_VERIFICATION: &str = "deltaVerification";
    pub const CREATE_ARTIFACT: &str = "createArtifact";
    pub const STDOUT_MODE_PREFIX: &str = "stdout-";
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a line that looked like a service message could not be decoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed service message")]
    Malformed,

    #[error("Field '{field}' could not be decoded: {source}")]
    Field {
        field: String,
        #[source]
        source: EncodingError,
    },

    #[error("Service message '{tag}' is missing required field '{field}'")]
    MissingField { tag: String, field: &'static str },

    #[error("Field '{field}' of '{tag}' is not a valid number: {value}")]
    InvalidNumber {
        tag: String,
        field: &'static str,
        value: String,
    },

    #[error("Unknown output mode '{0}'")]
    UnknownMode(String),
}

// ---------------------------------------------------------------------------
// Output modes
// ---------------------------------------------------------------------------

/// Severity of plain output lines, switched by `stdout-<mode>` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputMode {
    Verbose,
    Default,
    Warning,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            Self::Default => "default",
            Self::Warning => "warning",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "verbose" => Some(Self::Verbose),
            "default" => Some(Self::Default),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    /// The `stdout-<mode>` tag that switches to this mode.
    pub fn tag(self) -> String {
        format!("{}{}", tags::STDOUT_MODE_PREFIX, self.as_str())
    }

    /// The full marker line, e.g. `##octopus[stdout-verbose]`.
    pub fn marker_line(self) -> String {
        RawServiceMessage::new(self.tag()).to_string()
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// A tag plus ordered, already-decoded field values.
///
/// `Display` renders the wire form with every value base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServiceMessage {
    pub tag: String,
    pub fields: Vec<(String, String)>,
}

impl RawServiceMessage {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// The first value stored under `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &'static str) -> Result<String, DecodeError> {
        self.field(key)
            .map(str::to_string)
            .ok_or_else(|| DecodeError::MissingField {
                tag: self.tag.clone(),
                field: key,
            })
    }

    fn require_u64(&self, key: &'static str) -> Result<u64, DecodeError> {
        let value = self.require(key)?;
        value
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidNumber {
                tag: self.tag.clone(),
                field: key,
                value,
            })
    }
}

impl fmt::Display for RawServiceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MESSAGE_PREFIX}{}", self.tag)?;
        for (key, value) in &self.fields {
            write!(f, " {key}='{}'", encode_value(value))?;
        }
        f.write_str("]")
    }
}

// ---------------------------------------------------------------------------
// Typed messages
// ---------------------------------------------------------------------------

/// A package the script located on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundPackage {
    pub id: String,
    pub version: String,
    pub hash: String,
    pub remote_path: String,
}

/// Hash and size of a file reconstructed from a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaVerification {
    pub remote_path: String,
    pub hash: String,
    pub size: u64,
}

/// A file the script wants collected as a run artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedArtifact {
    pub path: String,
    pub name: String,
    pub length: u64,
}

/// Typed view of a service message, one variant per known tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    StdoutMode(OutputMode),
    SetVariable { name: String, value: String },
    FoundPackage(FoundPackage),
    /// Field-less marker preceding `foundPackage` when the exact version
    /// is already present.
    ExactPackageMatch,
    DeltaVerification(DeltaVerification),
    CreateArtifact(CreatedArtifact),
    /// A well-formed message with a tag this agent does not interpret.
    Unknown(RawServiceMessage),
}

impl ServiceMessage {
    pub fn set_variable(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetVariable {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Interpret a raw message by tag. Unrecognised tags become
    /// [`ServiceMessage::Unknown`]; recognised tags with missing or invalid
    /// fields are errors.
    pub fn from_raw(raw: RawServiceMessage) -> Result<Self, DecodeError> {
        if let Some(mode) = raw.tag.strip_prefix(tags::STDOUT_MODE_PREFIX) {
            return OutputMode::parse(mode)
                .map(Self::StdoutMode)
                .ok_or_else(|| DecodeError::UnknownMode(mode.to_string()));
        }

        let message = match raw.tag.as_str() {
            tags::SET_VARIABLE => Self::SetVariable {
                name: raw.require("name")?,
                value: raw.require("value")?,
            },
            tags::FOUND_PACKAGE => Self::FoundPackage(FoundPackage {
                id: raw.require("id")?,
                version: raw.require("version")?,
                hash: raw.require("hash")?,
                remote_path: raw.require("remotePath")?,
            }),
            tags::EXACT_PACKAGE_MATCH => Self::ExactPackageMatch,
            tags::DELTA_VERIFICATION => Self::DeltaVerification(DeltaVerification {
                remote_path: raw.require("remotePath")?,
                hash: raw.require("hash")?,
                size: raw.require_u64("size")?,
            }),
            tags::CREATE_ARTIFACT => Self::CreateArtifact(CreatedArtifact {
                path: raw.require("path")?,
                name: raw.require("name")?,
                length: raw.require_u64("length")?,
            }),
            _ => Self::Unknown(raw),
        };
        Ok(message)
    }

    /// The wire shape, fields in protocol order.
    pub fn to_raw(&self) -> RawServiceMessage {
        match self {
            Self::StdoutMode(mode) => RawServiceMessage::new(mode.tag()),
            Self::SetVariable { name, value } => RawServiceMessage::new(tags::SET_VARIABLE)
                .with_field("name", name)
                .with_field("value", value),
            Self::FoundPackage(p) => RawServiceMessage::new(tags::FOUND_PACKAGE)
                .with_field("id", &p.id)
                .with_field("version", &p.version)
                .with_field("hash", &p.hash)
                .with_field("remotePath", &p.remote_path),
            Self::ExactPackageMatch => RawServiceMessage::new(tags::EXACT_PACKAGE_MATCH),
            Self::DeltaVerification(d) => RawServiceMessage::new(tags::DELTA_VERIFICATION)
                .with_field("remotePath", &d.remote_path)
                .with_field("hash", &d.hash)
                .with_field("size", d.size.to_string()),
            Self::CreateArtifact(a) => RawServiceMessage::new(tags::CREATE_ARTIFACT)
                .with_field("path", &a.path)
                .with_field("name", &a.name)
                .with_field("length", a.length.to_string()),
            Self::Unknown(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for ServiceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_raw().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
