//! The single fatal-error path described in the design: every component
//! returns `Result<_, InterpError>` and nothing catches one to continue.

use std::fmt;

/// Where in the source an error was raised, taken from the active lexer
/// state at the point of failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// The five error kinds from the error-handling design, each carrying the
/// location it was raised at and a human-readable detail string.
#[derive(Debug, thiserror::Error)]
pub enum InterpError {
    #[error("{0}: lexical error: {1}")]
    Lexical(Location, String),

    #[error("{0}: syntax error: {1}")]
    Syntax(Location, String),

    #[error("{0}: semantic error: {1}")]
    Semantic(Location, String),

    #[error("{0}: runtime error: {1}")]
    Runtime(Location, String),

    #[error("{0}: preprocessing error: {1}")]
    Preprocessing(Location, String),
}

impl InterpError {
    pub fn lexical(loc: Location, msg: impl Into<String>) -> Self {
        InterpError::Lexical(loc, msg.into())
    }

    pub fn syntax(loc: Location, msg: impl Into<String>) -> Self {
        InterpError::Syntax(loc, msg.into())
    }

    pub fn semantic(loc: Location, msg: impl Into<String>) -> Self {
        InterpError::Semantic(loc, msg.into())
    }

    pub fn runtime(loc: Location, msg: impl Into<String>) -> Self {
        InterpError::Runtime(loc, msg.into())
    }

    pub fn preprocessing(loc: Location, msg: impl Into<String>) -> Self {
        InterpError::Preprocessing(loc, msg.into())
    }

    pub fn location(&self) -> &Location {
        match self {
            InterpError::Lexical(l, _)
            | InterpError::Syntax(l, _)
            | InterpError::Semantic(l, _)
            | InterpError::Runtime(l, _)
            | InterpError::Preprocessing(l, _) => l,
        }
    }
}

pub type Result<T> = std::result::Result<T, InterpError>;
