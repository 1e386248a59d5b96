use mpsh_client::FsErrorKind;

use super::builtins_fs::record;
use super::{ExecContext, Invocation};
use crate::alias::Aliases;
use crate::error::{ShellError, ShellResult};
use crate::help::{format_help, format_help_list, get_help};
use crate::lexer::quote;
use crate::options::OptionKey;
use crate::outcome::Outcome;
use crate::path::PathRef;
use crate::shell::Shell;

/// Nesting limit for `include` files that include each other.
const MAX_INCLUDE_DEPTH: usize = 8;

impl Shell {
    pub(crate) async fn try_execute_shell_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> Option<ShellResult<()>> {
        match inv.name.as_str() {
            "set" | "alias" | "unalias" | "include" | "help" | "shell" | "edit" => {
                Some(self.dispatch_shell_builtin(inv, outcome, ctx).await)
            }
            _ => None,
        }
    }

    async fn dispatch_shell_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        match inv.name.as_str() {
            "set" => self.cmd_set(inv, outcome, ctx).await,
            "alias" => self.cmd_alias(inv, outcome, ctx),
            "unalias" => self.cmd_unalias(inv, outcome),
            "include" => self.cmd_include(inv, outcome, ctx).await,
            "help" => Self::cmd_help(inv, ctx),
            "shell" => self.run_host_command(&inv.text(), outcome).await,
            "edit" => self.cmd_edit(inv, outcome).await,
            _ => unreachable!(),
        }
    }

    async fn cmd_set(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        if inv.words.is_empty() {
            for key in OptionKey::ALL {
                if let Some(line) = self.session.options.line_for(key) {
                    ctx.out(line.trim_start_matches("set "))?;
                }
            }
            return Ok(());
        }

        let mut changed = false;
        for word in &inv.words {
            let Some((key, value)) = word.text.split_once('=') else {
                outcome.fail(&word.text, "expected key=value");
                continue;
            };
            let key: OptionKey = match key.trim().parse() {
                Ok(key) => key,
                Err(e) => {
                    outcome.error(e);
                    continue;
                }
            };
            if key == OptionKey::Name {
                self.load_device_params().await?;
            }
            let unique_id = self.session.unique_id().to_string();
            match self
                .session
                .options
                .set(key, value, &unique_id, &self.colour)
            {
                Ok(()) => {
                    outcome.success(key.as_str());
                    changed = true;
                    if key == OptionKey::LsColour {
                        self.colour.extend_ls_spec(&self.session.options.ls_colours);
                    }
                    if matches!(key, OptionKey::Name | OptionKey::Names) {
                        self.refresh_name();
                    }
                }
                Err(e) => outcome.fail(key.as_str(), e),
            }
        }
        if changed {
            self.persist_options()?;
        }
        Ok(())
    }

    fn cmd_alias(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        if inv.words.is_empty() {
            for (name, template) in self.session.aliases.iter() {
                ctx.out(&format!("alias {name}={}", quote(template)))?;
            }
            return Ok(());
        }

        // Each operand either defines `name=template` or shows one alias.
        let mut changed = false;
        for word in &inv.words {
            if !word.text.contains('=') {
                match self.session.aliases.get(&word.text) {
                    Some(template) => {
                        ctx.out(&format!("alias {}={}", word.text, quote(template)))?;
                        outcome.success(&word.text);
                    }
                    None => outcome.fail(&word.text, "not found"),
                }
                continue;
            }
            let defined = Aliases::parse_definition(&word.text)
                .and_then(|(name, template)| {
                    self.session.aliases.define(&name, &template)?;
                    Ok((name, template))
                });
            match defined {
                Ok((name, template)) => {
                    tracing::debug!(alias = %name, template = %template, "alias defined");
                    outcome.success(name);
                    changed = true;
                }
                Err(e) => outcome.error(e),
            }
        }
        if changed {
            self.persist_options()?;
        }
        Ok(())
    }

    fn cmd_unalias(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        if inv.words.is_empty() {
            return Err(ShellError::Usage("unalias: missing alias name".to_string()));
        }
        let mut changed = false;
        for word in &inv.words {
            match self.session.aliases.remove(&word.text) {
                Ok(()) => {
                    outcome.success(&word.text);
                    changed = true;
                }
                Err(e) => outcome.error(e),
            }
        }
        if changed {
            self.persist_options()?;
        }
        Ok(())
    }

    async fn cmd_include(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(ShellError::Usage(format!(
                "include: nested more than {MAX_INCLUDE_DEPTH} levels"
            )));
        }
        for path in &inv.paths {
            let text = match self.read_file(path).await {
                Ok(data) => String::from_utf8_lossy(&data).into_owned(),
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    continue;
                }
            };
            self.include_depth += 1;
            let result = self.run_script(&text, ctx).await;
            self.include_depth -= 1;
            match result? {
                0 => outcome.success(path.to_string()),
                n => outcome.fail(path.to_string(), format!("{n} line(s) failed")),
            }
        }
        Ok(())
    }

    fn cmd_help(inv: &Invocation, ctx: &mut ExecContext) -> ShellResult<()> {
        let Some(name) = inv.words.first() else {
            return ctx.out(format_help_list().trim_end());
        };
        let help = get_help(&name.text)
            .ok_or_else(|| ShellError::CommandNotFound(name.text.clone()))?;
        ctx.out(format_help(help).trim_end())
    }

    /// Run a command in the local shell. `cd DIR` changes the local working
    /// directory instead, since a child shell cannot change ours.
    pub(crate) async fn run_host_command(
        &mut self,
        command: &str,
        outcome: &mut Outcome,
    ) -> ShellResult<()> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ShellError::Usage("shell: missing command".to_string()));
        }
        if command == "cd" || command.starts_with("cd ") {
            let dir = command[2..].trim();
            let target = self.session.resolver().resolve_local(dir);
            if !self.stat_path(&target).await?.is_dir {
                outcome.fail(target.to_string(), "Not a directory");
                return Ok(());
            }
            if let PathRef::Local(p) = &target {
                self.session.local_cwd.clone_from(p);
            }
            outcome.success(target.to_string());
            return Ok(());
        }

        let cwd = self.session.local_cwd.clone();
        let code = self
            .host
            .run_shell(command, &cwd)
            .await
            .map_err(|e| ShellError::local(&cwd, e))?;
        if code == 0 {
            outcome.success(command);
        } else {
            outcome.fail(command, format!("exit status {code}"));
        }
        Ok(())
    }

    /// Edit board files in a local temporary copy; only changed files are
    /// written back.
    async fn cmd_edit(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        for path in &inv.paths {
            if let PathRef::Local(p) = path {
                let result = match self.host.edit(p).await {
                    Ok(0) => Ok(()),
                    Ok(code) => Err(ShellError::Usage(format!("editor exit status {code}"))),
                    Err(e) => Err(ShellError::local(p, e)),
                };
                record(outcome, path, result)?;
                continue;
            }

            let original = match self.read_file(path).await {
                Ok(data) => data,
                Err(ShellError::Fs(e)) if e.kind == FsErrorKind::NotFound => Vec::new(),
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    continue;
                }
            };
            let suffix = path
                .file_name()
                .and_then(|n| n.rfind('.').map(|i| n[i..].to_string()))
                .unwrap_or_default();
            let tmp = tempfile::Builder::new()
                .prefix("mpsh-")
                .suffix(&suffix)
                .tempfile()?;
            std::fs::write(tmp.path(), &original).map_err(|e| ShellError::local(tmp.path(), e))?;

            let code = self
                .host
                .edit(tmp.path())
                .await
                .map_err(|e| ShellError::local(tmp.path(), e))?;
            if code != 0 {
                outcome.fail(path.to_string(), format!("editor exit status {code}"));
                continue;
            }
            let edited = std::fs::read(tmp.path()).map_err(|e| ShellError::local(tmp.path(), e))?;
            if edited == original {
                tracing::debug!(path = %path, "unchanged, not written back");
                outcome.success(path.to_string());
                continue;
            }
            let result = self.write_file(path, &edited).await;
            record(outcome, path, result)?;
        }
        Ok(())
    }
}
