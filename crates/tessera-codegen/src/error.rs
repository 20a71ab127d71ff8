use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of a node in its template, reported as `file:line:column`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A fatal generation failure. Node-related variants carry the position of
/// the offending node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("{position}: malformed {kind}: {message}")]
    MalformedNode {
        position: Position,
        kind: &'static str,
        message: String,
    },
    #[error("{position}: no handler is bound to tag `{tag}`")]
    UnresolvedHandler { position: Position, tag: String },
    #[error("{position}: handler `{handler}` has no setter for attribute `{attribute}`")]
    UnknownSetter {
        position: Position,
        handler: String,
        attribute: String,
    },
    #[error("{position}: attribute `{attribute}`: cannot convert `{value}` to {target}")]
    IllegalCoercion {
        position: Position,
        attribute: String,
        value: String,
        target: String,
    },
    #[error("{position}: unexpected {kind} node here")]
    UnexpectedNode {
        position: Position,
        kind: &'static str,
    },
    #[error("internal generator error: {0}")]
    Internal(String),
}

impl CodegenError {
    pub fn position(&self) -> Option<&Position> {
        match self {
            CodegenError::MalformedNode { position, .. }
            | CodegenError::UnresolvedHandler { position, .. }
            | CodegenError::UnknownSetter { position, .. }
            | CodegenError::IllegalCoercion { position, .. }
            | CodegenError::UnexpectedNode { position, .. } => Some(position),
            CodegenError::Internal(_) => None,
        }
    }

    pub(crate) fn malformed(
        position: &Position,
        kind: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CodegenError::MalformedNode {
            position: position.clone(),
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_leads_with_position() {
        let err = CodegenError::UnresolvedHandler {
            position: Position::new("index.tsr", 4, 9),
            tag: "c:each".into(),
        };
        assert_eq!(err.to_string(), "index.tsr:4:9: no handler is bound to tag `c:each`");
        assert_eq!(err.position().map(|p| p.line), Some(4));
    }
}
