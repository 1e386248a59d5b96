//! Shell state and the line execution engine

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use mpsh_client::{Board, Evaluator, RawMode};

use tokio::sync::Notify;

use crate::colour::AnsiColour;
use crate::commands::ExecContext;
use crate::error::{ShellError, ShellResult};
use crate::host::Host;
use crate::lexer::{split_line, split_magic_line, Subcommand};
use crate::options::{MemoryStore, OptionStore};
use crate::outcome::{LineReport, Outcome};
use crate::path::{PathRef, REMOTE_MARK};
use crate::prompt::{self, path_tail, placeholders, short_device_name};
use crate::session::Session;

/// Prompt parameters that come from the board and never change.
const DEVICE_PARAMS: &[&str] = &[
    "device", "dev", "platform", "unique_id", "id", "name", "sysname", "nodename", "release",
    "version", "machine",
];

/// Toggles magic-by-default mode.
const MULTI_TOGGLE: &str = "%%";

pub struct Shell {
    pub session: Session,
    pub(crate) board: Box<dyn Board>,
    pub(crate) host: Box<dyn Host>,
    pub(crate) store: Box<dyn OptionStore>,
    pub(crate) colour: AnsiColour,
    /// Bytes per read or write snippet during transfers.
    pub(crate) chunk_size: usize,
    /// Board work is abandoned when this fires.
    pub(crate) interrupts: Option<Arc<Notify>>,
    /// Write option changes to the store. Off while replaying it.
    pub(crate) persist: bool,
    pub(crate) include_depth: usize,
    params_loaded: bool,
}

pub struct ShellBuilder {
    board: Box<dyn Board>,
    host: Option<Box<dyn Host>>,
    store: Box<dyn OptionStore>,
    colour: AnsiColour,
    chunk_size: usize,
    interrupts: Option<Arc<Notify>>,
    local_cwd: PathBuf,
    device_name: String,
}

impl ShellBuilder {
    pub fn host(mut self, host: impl Host + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    pub fn store(mut self, store: impl OptionStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn colour(mut self, colour: AnsiColour) -> Self {
        self.colour = colour;
        self
    }

    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Interrupt running board work whenever `notify` fires.
    pub fn interrupt_on(mut self, notify: Arc<Notify>) -> Self {
        self.interrupts = Some(notify);
        self
    }

    pub fn local_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.local_cwd = cwd.into();
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn build(self) -> Shell {
        let host = self
            .host
            .unwrap_or_else(|| Box::new(crate::host::SystemHost::new("vi")));
        Shell {
            session: Session::new(self.local_cwd, self.device_name),
            board: self.board,
            host,
            store: self.store,
            colour: self.colour,
            chunk_size: self.chunk_size.max(1),
            interrupts: self.interrupts,
            persist: true,
            include_depth: 0,
            params_loaded: false,
        }
    }
}

impl Shell {
    pub fn builder(board: impl Board + 'static) -> ShellBuilder {
        ShellBuilder {
            board: Box::new(board),
            host: None,
            store: Box::new(MemoryStore::default()),
            colour: AnsiColour::with_ls_colors("", false),
            chunk_size: 256,
            interrupts: None,
            local_cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            device_name: String::new(),
        }
    }

    pub fn raw_mode(&self) -> RawMode {
        self.board.mode()
    }

    /// Execute one input line, writing to the terminal.
    pub async fn execute(&mut self, line: &str) -> ShellResult<LineReport> {
        self.execute_with(line, &mut ExecContext::default()).await
    }

    /// Execute one input line. Failures are collected and printed once the
    /// whole line has run; only a lost connection is returned as `Err`.
    pub async fn execute_with(
        &mut self,
        line: &str,
        ctx: &mut ExecContext,
    ) -> ShellResult<LineReport> {
        let trimmed = line.trim();
        if trimmed == MULTI_TOGGLE {
            self.session.multi = !self.session.multi;
            tracing::debug!(multi = self.session.multi, "mode toggled");
            return Ok(LineReport::default());
        }
        if self.session.multi && matches!(trimmed, "quit" | "exit") {
            self.session.multi = false;
            return Ok(LineReport::default());
        }

        let parsed = if self.session.multi {
            split_magic_line(line)
        } else {
            split_line(line)
        };
        let subcommands = match parsed {
            Ok(subcommands) if subcommands.is_empty() && self.session.in_continuation() => {
                // An empty line ends a compound statement on the board.
                vec![Subcommand::Passthrough(String::new())]
            }
            Ok(subcommands) => subcommands,
            Err(e) => {
                let mut report = LineReport::default();
                report.push("mpsh", Outcome::aborted(e));
                report_failures(&report, ctx);
                return Ok(report);
            }
        };
        self.execute_parsed(subcommands, ctx).await
    }

    async fn execute_parsed(
        &mut self,
        subcommands: Vec<Subcommand>,
        ctx: &mut ExecContext,
    ) -> ShellResult<LineReport> {
        let mut report = LineReport::default();
        let mut fatal = None;
        for subcommand in subcommands {
            let (name, result) = match subcommand {
                Subcommand::Magic(words) => {
                    let name = words.first().map(|w| w.text.clone()).unwrap_or_default();
                    (name, self.run_magic(&words, ctx).await)
                }
                Subcommand::Shell(command) => {
                    let mut outcome = Outcome::new();
                    let result = self.run_host_command(&command, &mut outcome).await;
                    ("shell".to_string(), result.map(|()| outcome))
                }
                Subcommand::Passthrough(text) => ("repl".to_string(), self.passthrough(&text, ctx).await),
            };
            match result {
                Ok(outcome) => report.push(name, outcome),
                Err(e) if e.ends_line() => {
                    // The rest of the line is abandoned.
                    report.push(name, Outcome::aborted(&e));
                    if e.is_fatal() {
                        fatal = Some(e);
                    }
                    break;
                }
                Err(e) => report.push(name, Outcome::aborted(e)),
            }
        }
        report_failures(&report, ctx);
        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Send a line to the board's own REPL and print what it answers.
    async fn passthrough(&mut self, text: &str, ctx: &mut ExecContext) -> ShellResult<Outcome> {
        let interrupted = self.interrupted();
        let interaction = tokio::select! {
            result = self.board.interact(text) => result?,
            () = interrupted => {
                self.board.interrupt().await?;
                return Err(ShellError::Interrupted);
            }
        };
        ctx.stdout.write(interaction.output.as_bytes())?;
        self.session.device_prompt = interaction.prompt;
        Ok(Outcome::new())
    }

    /// Resolves when an interrupt arrives, or never if none is wired up.
    pub(crate) fn interrupted(&self) -> impl Future<Output = ()> + Send + 'static {
        let notify = self.interrupts.clone();
        async move {
            match notify {
                Some(notify) => notify.notified().await,
                None => std::future::pending().await,
            }
        }
    }

    /// Run a file's worth of magic commands, one per line. Returns how
    /// many lines had failures.
    pub(crate) fn run_script<'a>(
        &'a mut self,
        text: &'a str,
        ctx: &'a mut ExecContext,
    ) -> Pin<Box<dyn Future<Output = ShellResult<usize>> + 'a>> {
        Box::pin(async move {
            let mut failed = 0;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let report = match split_magic_line(line) {
                    Ok(subcommands) => self.execute_parsed(subcommands, ctx).await?,
                    Err(e) => {
                        ctx.write_err(&format!("mpsh: {e}"));
                        failed += 1;
                        continue;
                    }
                };
                if !report.all_succeeded() {
                    failed += 1;
                }
            }
            Ok(failed)
        })
    }

    /// Replay the option store, then the rc file, without writing the
    /// store back.
    pub async fn startup(&mut self, rc_file: Option<&Path>) -> ShellResult<()> {
        let mut ctx = ExecContext::default();
        self.persist = false;
        let result = self.replay(rc_file, &mut ctx).await;
        self.persist = true;
        result
    }

    async fn replay(&mut self, rc_file: Option<&Path>, ctx: &mut ExecContext) -> ShellResult<()> {
        let stored = self.store.load()?.join("\n");
        let failed = self.run_script(&stored, ctx).await?;
        if failed > 0 {
            tracing::warn!(failed, "some stored options could not be applied");
        }
        if let Some(path) = rc_file.filter(|p| p.is_file()) {
            let text = std::fs::read_to_string(path).map_err(|e| ShellError::local(path, e))?;
            tracing::debug!(rc = %path.display(), "running rc file");
            self.run_script(&text, ctx).await?;
        }
        Ok(())
    }

    pub(crate) fn persist_options(&mut self) -> ShellResult<()> {
        if !self.persist {
            return Ok(());
        }
        let lines = self.session.options.to_lines(&self.session.aliases);
        self.store.save(&lines)?;
        Ok(())
    }

    /// Fetch the board's identity once per session.
    pub(crate) async fn load_device_params(&mut self) -> ShellResult<()> {
        if self.params_loaded {
            return Ok(());
        }
        let info = self.board.info().await?;
        let id_start = info.unique_id.len().saturating_sub(8);
        let params = &mut self.session.params;
        params.insert("device".into(), self.session.device_name.clone());
        params.insert("dev".into(), short_device_name(&self.session.device_name));
        params.insert("id".into(), info.unique_id.get(id_start..).unwrap_or_default().to_string());
        params.insert("unique_id".into(), info.unique_id.clone());
        params.insert("platform".into(), info.platform.clone());
        params.insert("sysname".into(), info.sysname.clone());
        params.insert("nodename".into(), info.nodename.clone());
        params.insert("release".into(), info.release.clone());
        params.insert("version".into(), info.version.clone());
        params.insert("machine".into(), info.machine);
        self.params_loaded = true;
        self.refresh_name();
        Ok(())
    }

    /// The board's display name: its configured name, or its short id.
    pub(crate) fn refresh_name(&mut self) {
        let params = &self.session.params;
        let name = self
            .session
            .options
            .names
            .get(self.session.unique_id())
            .or_else(|| params.get("id"))
            .cloned()
            .unwrap_or_default();
        self.session.params.insert("name".into(), name);
    }

    /// Values for the placeholders `template` uses. The board is only
    /// asked for what the template needs.
    pub(crate) async fn prompt_params(
        &mut self,
        template: &str,
    ) -> ShellResult<BTreeMap<String, String>> {
        let wanted = placeholders(template);
        if wanted.iter().any(|w| DEVICE_PARAMS.contains(&w.as_str())) {
            self.load_device_params().await?;
        }
        let mut params = self.session.params.clone();
        params.extend(self.colour.palette());

        let lcd = self.session.local_cwd.to_string_lossy().into_owned();
        for n in 1..=3 {
            params.insert(format!("lcd{n}"), path_tail(&lcd, n));
        }
        params.insert("lcd".into(), lcd);
        params.insert("pwd".into(), self.session.remote_cwd.clone());

        if wanted.iter().any(|w| w == "free" || w == "free_pc") {
            let mem = self.board.mem_info(false).await?;
            let pc = if mem.total() == 0 { 0 } else { mem.free * 100 / mem.total() };
            let colour = match pc {
                51.. => "green",
                26..=50 => "yellow",
                _ => "red",
            };
            params.insert("free".into(), mem.free.to_string());
            params.insert("free_pc".into(), self.colour.paint(colour, &format!("{pc}%")));
        }
        Ok(params)
    }

    /// The prompt to show before reading the next line.
    pub async fn prompt(&mut self) -> String {
        if !self.session.multi {
            let colour = self.session.options.prompt_colour.clone();
            return self.colour.paint(&colour, &self.session.device_prompt);
        }
        let template = self.session.options.prompt.clone();
        let params = match self.prompt_params(&template).await {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(error = %e, "prompt parameters unavailable");
                BTreeMap::new()
            }
        };
        let rendered = prompt::render(&template, &params, &self.session.options.missing);
        format!("{rendered}{}", self.colour.ansi("reset"))
    }

    /// Entry names in the directory a completion prefix points into.
    /// Board directories are named with the remote marker.
    pub async fn complete_dir(&mut self, dir: &str) -> Vec<(String, bool)> {
        if dir.starts_with(REMOTE_MARK) && self.session.in_continuation() {
            return Vec::new();
        }
        let path: PathRef = self.session.resolver().resolve(dir);
        match self.list_path(&path).await {
            Ok(entries) => entries.into_iter().map(|e| (e.name, e.is_dir)).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Current alias names, for completion.
    pub fn alias_names(&self) -> Vec<String> {
        self.session.aliases.names().map(str::to_string).collect()
    }
}

fn report_failures(report: &LineReport, ctx: &mut ExecContext) {
    for line in report.failure_lines() {
        ctx.write_err(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_params_cover_default_prompt() {
        for name in placeholders(crate::options::DEFAULT_PROMPT) {
            let known = DEVICE_PARAMS.contains(&name.as_str())
                || ["pwd", "free", "free_pc"].contains(&name.as_str())
                || AnsiColour::with_ls_colors("", true).is_colour(&name);
            assert!(known, "{name} has no value");
        }
    }
}
