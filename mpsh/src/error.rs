//! Error types for mpsh

use std::path::PathBuf;

use mpsh_client::{DeviceError, RemoteFsError};
use thiserror::Error;

use crate::commands::local_fs::describe_io;

/// Result type alias for mpsh operations
pub type ShellResult<T> = Result<T, ShellError>;

/// A command line that cannot be split or tokenized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("syntax error: {0}")]
    Syntax(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    /// `{N}` named an argument the invocation did not supply.
    #[error("{name}: positional argument {index} is not defined")]
    UndefinedPositionalArg { name: String, index: usize },

    #[error("{0}: is a built-in command")]
    Reserved(String),

    #[error("invalid alias: {0}")]
    InvalidDefinition(String),

    #[error("{0}: no such alias")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0}: No match")]
    NoMatch(String),

    #[error("{0}: remote paths are not accepted here")]
    RemoteNotAllowed(String),
}

/// Error types for mpsh shell operations
#[derive(Error, Debug)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Alias(#[from] AliasError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Remote filesystem failure, already carrying the path.
    #[error(transparent)]
    Fs(RemoteFsError),

    #[error(transparent)]
    Device(DeviceError),

    /// Local filesystem failure.
    #[error("{}: {}", path.display(), describe_io(source))]
    Local {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid option -- '{0}'")]
    UnknownFlag(String),

    #[error("{0}")]
    Usage(String),

    /// `cp`/`mv` operands naming both local and remote paths.
    #[error("cannot mix local and remote paths: {0}")]
    DomainMismatch(String),

    #[error("{0}")]
    InvalidOption(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("interrupted")]
    Interrupted,
}

impl ShellError {
    pub fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Local {
            path: path.into(),
            source,
        }
    }

    /// Errors that end the whole line rather than one subcommand.
    pub fn ends_line(&self) -> bool {
        match self {
            Self::Device(e) => e.is_fatal(),
            Self::Interrupted => true,
            _ => false,
        }
    }

    /// Transport loss: the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Device(e) if e.is_fatal())
    }
}

impl From<DeviceError> for ShellError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Fs(e) => Self::Fs(e),
            other => Self::Device(other),
        }
    }
}

impl From<RemoteFsError> for ShellError {
    fn from(err: RemoteFsError) -> Self {
        Self::Fs(err)
    }
}
