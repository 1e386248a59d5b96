//! mpsh - Interactive shell for MicroPython boards
//!
//! This crate provides:
//! - A line shell that passes Python through to the board's REPL and runs
//!   `%` magic commands on both the board and the local filesystem
//! - `:`-marked board paths with glob expansion on either side
//! - Aliases, typed options and templated prompts, persisted between sessions

pub mod alias;
pub mod colour;
pub mod commands;
pub mod error;
pub mod glob;
pub mod help;
pub mod host;
pub mod lexer;
pub mod options;
pub mod outcome;
pub mod path;
pub mod prompt;
pub mod session;
pub mod shell;

pub use commands::{ExecContext, Output};
pub use error::{ShellError, ShellResult};
pub use host::{Host, SystemHost};
pub use options::{FileStore, MemoryStore, OptionStore};
pub use outcome::{LineReport, Outcome, Status};
pub use path::PathRef;
pub use session::Session;
pub use shell::{Shell, ShellBuilder};
