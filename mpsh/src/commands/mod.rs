//! Built-in commands and the per-subcommand dispatch path.
//!
//! Every magic subcommand goes through [`Shell::run_magic`]: alias
//! expansion, flag parsing, operand resolution, then the handler, bracketed
//! by the board's raw-mode hold when the command talks to the board.

use std::collections::BTreeSet;
use std::io::Write;

use mpsh_client::Evaluator;

use crate::alias;
use crate::error::{ShellError, ShellResult};
use crate::help::{format_help, get_help, wants_help};
use crate::lexer::{tokenize, Word};
use crate::outcome::Outcome;
use crate::path::{is_marked, Domain, PathRef};
use crate::shell::Shell;

mod builtins_board;
mod builtins_fs;
mod builtins_shell;
mod builtins_transfer;
pub(crate) mod fs;
pub(crate) mod local_fs;

pub use fs::Entry;

pub enum Output {
    Stdout,
    Stderr,
    Buffer(Vec<u8>),
}

impl Output {
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = std::io::stdout();
                out.write_all(data)?;
                out.flush()
            }
            Self::Stderr => std::io::stderr().write_all(data),
            Self::Buffer(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
        }
    }

    pub fn writeln(&mut self, s: &str) -> std::io::Result<()> {
        self.write(s.as_bytes())?;
        self.write(b"\n")
    }

    /// Captured text, for buffers.
    pub fn text(&self) -> String {
        match self {
            Self::Buffer(buf) => String::from_utf8_lossy(buf).into_owned(),
            _ => String::new(),
        }
    }
}

pub struct ExecContext {
    pub stdout: Output,
    pub stderr: Output,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self {
            stdout: Output::Stdout,
            stderr: Output::Stderr,
        }
    }
}

impl ExecContext {
    /// Context capturing both streams.
    pub fn captured() -> Self {
        Self {
            stdout: Output::Buffer(Vec::new()),
            stderr: Output::Buffer(Vec::new()),
        }
    }

    pub fn out(&mut self, line: &str) -> ShellResult<()> {
        self.stdout.writeln(line).map_err(ShellError::Io)
    }

    pub fn write_err(&mut self, msg: &str) {
        let _ = self.stderr.writeln(msg);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FlagSpec {
    pub short: char,
    pub long: &'static str,
}

const fn flag(short: char, long: &'static str) -> FlagSpec {
    FlagSpec { short, long }
}

/// How a command's operands are resolved before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operands.
    None,
    /// Free text handed to the handler as words.
    Text,
    /// Paths on the side their marker names, globbed.
    Paths,
    /// Local paths, globbed; a marker is an error.
    LocalPaths,
    /// Board paths whether marked or not, globbed.
    RemotePaths,
    /// Globbed sources followed by one plain destination.
    SourcesDest,
    /// Sources on a fixed side, then an optional marked destination on the
    /// other side.
    Transfer(Domain),
}

/// When the board must be held in raw mode around a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardUse {
    Never,
    Always,
    /// Only when a resolved operand (or the default operand) is remote.
    RemoteOperands,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub flags: &'static [FlagSpec],
    pub operands: OperandKind,
    pub board: BoardUse,
}

const fn spec(
    name: &'static str,
    flags: &'static [FlagSpec],
    operands: OperandKind,
    board: BoardUse,
) -> CommandSpec {
    CommandSpec {
        name,
        flags,
        operands,
        board,
    }
}

const RECURSIVE: FlagSpec = flag('r', "recursive");
const VERBOSE: FlagSpec = flag('v', "verbose");
const DRY_RUN: FlagSpec = flag('n', "dry-run");

pub const COMMANDS: &[CommandSpec] = &[
    spec("alias", &[], OperandKind::Text, BoardUse::Never),
    spec("cat", &[], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("cd", &[], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("cp", &[RECURSIVE, VERBOSE], OperandKind::SourcesDest, BoardUse::RemoteOperands),
    spec("df", &[], OperandKind::RemotePaths, BoardUse::Always),
    spec("echo", &[flag('n', "no-newline")], OperandKind::Text, BoardUse::Always),
    spec("edit", &[], OperandKind::RemotePaths, BoardUse::Never),
    spec("eval", &[], OperandKind::Text, BoardUse::Always),
    spec("exec", &[], OperandKind::Text, BoardUse::Always),
    spec("free", &[], OperandKind::None, BoardUse::Always),
    spec("fs", &[], OperandKind::Text, BoardUse::Never),
    spec("gc", &[], OperandKind::None, BoardUse::Always),
    spec("get", &[RECURSIVE, VERBOSE, DRY_RUN], OperandKind::Transfer(Domain::Remote), BoardUse::Always),
    spec("help", &[], OperandKind::Text, BoardUse::Never),
    spec("include", &[], OperandKind::LocalPaths, BoardUse::Never),
    spec("lcd", &[], OperandKind::LocalPaths, BoardUse::Never),
    spec("ls", &[flag('l', "long"), flag('R', "recursive")], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("mkdir", &[flag('p', "parents")], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("mount", &[], OperandKind::LocalPaths, BoardUse::Never),
    spec("mv", &[VERBOSE], OperandKind::SourcesDest, BoardUse::RemoteOperands),
    spec("put", &[RECURSIVE, VERBOSE, DRY_RUN], OperandKind::Transfer(Domain::Local), BoardUse::Always),
    spec("pwd", &[], OperandKind::None, BoardUse::Never),
    spec("reset", &[], OperandKind::None, BoardUse::Never),
    spec("rm", &[RECURSIVE, VERBOSE], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("rmdir", &[], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("run", &[], OperandKind::LocalPaths, BoardUse::Always),
    spec("set", &[], OperandKind::Text, BoardUse::Never),
    spec("shell", &[], OperandKind::Text, BoardUse::Never),
    spec("time", &[], OperandKind::Text, BoardUse::Always),
    spec("touch", &[], OperandKind::Paths, BoardUse::RemoteOperands),
    spec("umount", &[], OperandKind::None, BoardUse::Never),
    spec("uname", &[], OperandKind::None, BoardUse::Always),
    spec("unalias", &[], OperandKind::Text, BoardUse::Never),
];

/// Commands `fs` forwards to.
const FS_SUBCOMMANDS: &[&str] = &["cat", "ls", "cp", "rm", "mkdir", "rmdir"];

/// `fs CMD ARGS` runs as `CMD ARGS` for the filesystem commands.
fn forward_fs(words: Vec<Word>) -> ShellResult<Vec<Word>> {
    match words.split_first() {
        Some((first, args)) if first.text == "fs" && !first.quoted && !wants_help(args) => {
            let Some(sub) = args.first() else {
                return Err(ShellError::Usage("No fs command provided".to_string()));
            };
            if !FS_SUBCOMMANDS.contains(&sub.text.as_str()) {
                return Err(ShellError::Usage(format!("Invalid fs command: {}", sub.text)));
            }
            Ok(args.to_vec())
        }
        _ => Ok(words),
    }
}

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|c| c.name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(BTreeSet<char>);

impl Flags {
    pub fn has(&self, short: char) -> bool {
        self.0.contains(&short)
    }
}

/// One parsed subcommand, consumed by a single handler call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub flags: Flags,
    /// Operand words as typed.
    pub words: Vec<Word>,
    /// Resolved operands, for path commands.
    pub paths: Vec<PathRef>,
    /// Destination for `cp`, `mv`, `put` and `get`.
    pub dest: Option<PathRef>,
}

impl Invocation {
    /// Operand words joined back into text.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Separate leading flags from operands.
///
/// Short flags combine (`-lR`), long flags are spelled out, `--` ends the
/// flags and anything after the first operand is an operand.
pub fn parse_flags(spec: &CommandSpec, words: &[Word]) -> ShellResult<(Flags, Vec<Word>)> {
    let mut flags = BTreeSet::new();
    if spec.flags.is_empty() {
        return Ok((Flags(flags), words.to_vec()));
    }
    let mut rest = words;
    while let Some((word, tail)) = rest.split_first() {
        if !word.is_flag_like() {
            break;
        }
        rest = tail;
        if word.text == "--" {
            break;
        }
        if let Some(long) = word.text.strip_prefix("--") {
            let found = spec
                .flags
                .iter()
                .find(|f| f.long == long)
                .ok_or_else(|| ShellError::UnknownFlag(word.text.clone()))?;
            flags.insert(found.short);
            continue;
        }
        for c in word.text.chars().skip(1) {
            if !spec.flags.iter().any(|f| f.short == c) {
                return Err(ShellError::UnknownFlag(c.to_string()));
            }
            flags.insert(c);
        }
    }
    Ok((Flags(flags), rest.to_vec()))
}

impl Shell {
    /// Run one magic subcommand and report what happened to its operands.
    ///
    /// Only errors that end the line are returned as `Err`; everything else
    /// is recorded in the outcome.
    pub(crate) async fn run_magic(
        &mut self,
        words: &[Word],
        ctx: &mut ExecContext,
    ) -> ShellResult<Outcome> {
        let words = match self.expand_alias(words).and_then(forward_fs) {
            Ok(words) => words,
            Err(e) => return Ok(Outcome::aborted(e)),
        };
        let Some((name_word, args)) = words.split_first() else {
            return Ok(Outcome::new());
        };
        let name = name_word.text.as_str();
        let Some(spec) = lookup(name) else {
            return Ok(Outcome::aborted(ShellError::CommandNotFound(name.to_string())));
        };

        if wants_help(args) {
            if let Some(help) = get_help(name) {
                ctx.out(format_help(help).trim_end())?;
            }
            return Ok(Outcome::new());
        }

        let (flags, operands) = match parse_flags(spec, args) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(Outcome::aborted(e)),
        };
        let mut outcome = Outcome::new();
        let mut inv = Invocation {
            name: name.to_string(),
            flags,
            words: operands,
            paths: Vec::new(),
            dest: None,
        };
        match self.resolve_operands(spec, &mut inv, &mut outcome).await {
            Ok(true) => {}
            Ok(false) => return Ok(outcome),
            Err(e) if e.ends_line() => return Err(e),
            Err(e) => {
                outcome.error(e);
                return Ok(outcome);
            }
        }

        tracing::debug!(command = name, operands = inv.words.len(), "dispatch");
        let hold = match spec.board {
            BoardUse::Never => false,
            BoardUse::Always => true,
            BoardUse::RemoteOperands => {
                (inv.paths.is_empty() && inv.words.is_empty())
                    || inv.paths.iter().chain(&inv.dest).any(PathRef::is_remote)
            }
        };
        if hold {
            self.board.hold().await?;
        }
        let result = self.invoke(&inv, &mut outcome, ctx).await;
        if matches!(result, Err(ShellError::Interrupted)) {
            // The interrupt drops every hold, so there is nothing to release.
            self.board.interrupt().await?;
            return Err(ShellError::Interrupted);
        }
        if hold {
            let released = self.board.release().await;
            if result.is_ok() {
                released?;
            }
        }

        match result {
            Ok(()) => Ok(outcome),
            Err(e) if e.ends_line() => Err(e),
            Err(e) => {
                outcome.error(e);
                Ok(outcome)
            }
        }
    }

    /// Replace a leading alias name with its expansion, once.
    fn expand_alias(&self, words: &[Word]) -> ShellResult<Vec<Word>> {
        let Some((first, args)) = words.split_first() else {
            return Ok(Vec::new());
        };
        match self.session.aliases.get(&first.text) {
            Some(template) if !first.quoted => {
                let text = alias::expand(&first.text, template, args)?;
                tracing::debug!(alias = %first.text, expanded = %text, "alias");
                Ok(tokenize(&text)?)
            }
            _ => Ok(words.to_vec()),
        }
    }

    /// Fill in `inv.paths` and `inv.dest`. Operands that fail to resolve
    /// are recorded; returns `false` when nothing is left to run on.
    async fn resolve_operands(
        &mut self,
        spec: &CommandSpec,
        inv: &mut Invocation,
        outcome: &mut Outcome,
    ) -> ShellResult<bool> {
        let (sources, domain) = match spec.operands {
            OperandKind::None | OperandKind::Text => return Ok(true),
            OperandKind::Paths => (inv.words.clone(), None),
            OperandKind::LocalPaths => {
                if let Some(marked) = inv.words.iter().find(|w| is_marked(&w.text)) {
                    return Err(crate::error::ResolveError::RemoteNotAllowed(marked.text.clone()).into());
                }
                (inv.words.clone(), Some(Domain::Local))
            }
            OperandKind::RemotePaths => (inv.words.clone(), Some(Domain::Remote)),
            OperandKind::SourcesDest => {
                let Some((last, sources)) = inv.words.split_last() else {
                    return Err(ShellError::Usage(format!("{}: missing destination", inv.name)));
                };
                if sources.is_empty() {
                    return Err(ShellError::Usage(format!(
                        "{}: missing destination after {}",
                        inv.name, last.text
                    )));
                }
                inv.dest = Some(self.session.resolver().resolve(&last.text));
                (sources.to_vec(), None)
            }
            OperandKind::Transfer(from) => {
                let mut sources = inv.words.clone();
                let dest_marked = sources.len() >= 2
                    && sources.last().is_some_and(|w| is_marked(&w.text));
                if dest_marked {
                    if let Some(last) = sources.pop() {
                        inv.dest = Some(self.session.resolver().resolve_in(from.other(), &last.text));
                    }
                }
                if sources.is_empty() {
                    return Err(ShellError::Usage(format!("{}: no source files", inv.name)));
                }
                (sources, Some(from))
            }
        };

        for word in &sources {
            match self.expand_word(word, domain).await {
                Ok(paths) => inv.paths.extend(paths),
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => outcome.error(e),
            }
        }
        // The resolved side decides, so a mounted folder counts as local.
        if let (OperandKind::SourcesDest, Some(dest)) = (spec.operands, &inv.dest) {
            if inv.paths.iter().any(|p| p.domain() != dest.domain()) {
                return Err(ShellError::DomainMismatch(inv.text()));
            }
        }
        Ok(sources.is_empty() || !inv.paths.is_empty())
    }

    /// Run the handler, racing it against an interrupt.
    async fn invoke(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let interrupted = self.interrupted();
        tokio::select! {
            result = self.dispatch(inv, outcome, ctx) => result,
            () = interrupted => Err(ShellError::Interrupted),
        }
    }

    async fn dispatch(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        if let Some(result) = self.try_execute_fs_builtin(inv, outcome, ctx).await {
            return result;
        }
        if let Some(result) = self.try_execute_transfer_builtin(inv, outcome, ctx).await {
            return result;
        }
        if let Some(result) = self.try_execute_board_builtin(inv, outcome, ctx).await {
            return result;
        }
        if let Some(result) = self.try_execute_shell_builtin(inv, outcome, ctx).await {
            return result;
        }
        Err(ShellError::CommandNotFound(inv.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(args: &[&str]) -> Vec<Word> {
        args.iter().map(|a| Word::new(*a)).collect()
    }

    fn spec_of(name: &str) -> &'static CommandSpec {
        lookup(name).unwrap()
    }

    #[test]
    fn test_combined_short_flags() {
        let (flags, rest) = parse_flags(spec_of("ls"), &words(&["-lR", ":/lib"])).unwrap();
        assert!(flags.has('l') && flags.has('R'));
        assert_eq!(rest, words(&[":/lib"]));
    }

    #[test]
    fn test_long_flags_and_double_dash() {
        let (flags, rest) =
            parse_flags(spec_of("rm"), &words(&["--recursive", "--", "-odd"])).unwrap();
        assert!(flags.has('r'));
        assert_eq!(rest, words(&["-odd"]));
    }

    #[test]
    fn test_dash_after_operand_is_operand() {
        let (flags, rest) = parse_flags(spec_of("rm"), &words(&["a", "-r"])).unwrap();
        assert!(!flags.has('r'));
        assert_eq!(rest, words(&["a", "-r"]));
    }

    #[test]
    fn test_unknown_flag() {
        let err = parse_flags(spec_of("ls"), &words(&["-x"])).unwrap_err();
        assert!(matches!(err, ShellError::UnknownFlag(f) if f == "x"));
        assert!(parse_flags(spec_of("ls"), &words(&["--bogus"])).is_err());
    }

    #[test]
    fn test_flagless_commands_keep_dashes() {
        let (_, rest) = parse_flags(spec_of("eval"), &words(&["-1"])).unwrap();
        assert_eq!(rest, words(&["-1"]));
    }

    #[test]
    fn test_fs_forwards_filesystem_commands() {
        assert_eq!(forward_fs(words(&["fs", "ls", "-l"])).unwrap(), words(&["ls", "-l"]));
        assert_eq!(forward_fs(words(&["fs", "--help"])).unwrap(), words(&["fs", "--help"]));
        assert_eq!(forward_fs(words(&["pwd"])).unwrap(), words(&["pwd"]));

        let err = forward_fs(words(&["fs"])).unwrap_err();
        assert_eq!(err.to_string(), "No fs command provided");
        let err = forward_fs(words(&["fs", "put", "a"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid fs command: put");
    }

    #[test]
    fn test_every_command_has_help() {
        for name in names() {
            assert!(get_help(name).is_some(), "missing help for {name}");
        }
    }
}
