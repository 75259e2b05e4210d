//! Command identity as seen by telemetry

use std::collections::HashMap;

/// Annotation value carried by commands generated from the API description
pub const GENERATED_MARKER: &str = "operation";

/// How a command came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Written by hand
    #[default]
    HandWritten,
    /// Mechanically produced from the API description
    Generated,
}

impl CommandKind {
    pub fn is_generated(&self) -> bool {
        matches!(self, CommandKind::Generated)
    }
}

/// Identity of the command being dispatched.
///
/// The kind is fixed when the descriptor is registered, so binding a command
/// to the event context never has to inspect annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    path: String,
    kind: CommandKind,
}

impl CommandDescriptor {
    /// A hand-written command with the given full path (e.g. `"stripe listen"`)
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: CommandKind::HandWritten,
        }
    }

    /// A command generated from the API description
    pub fn generated(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: CommandKind::Generated,
        }
    }

    /// Build a descriptor from a host framework's annotation mapping.
    ///
    /// The command is tagged generated iff any annotation value equals
    /// [`GENERATED_MARKER`].
    pub fn from_annotations(path: impl Into<String>, annotations: &HashMap<String, String>) -> Self {
        let kind = if annotations.values().any(|value| value == GENERATED_MARKER) {
            CommandKind::Generated
        } else {
            CommandKind::HandWritten
        };

        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }
}
