use std::future::Future;
use std::pin::Pin;

use chrono::DateTime;
use mpsh_client::RemoteFs;

use super::fs::Entry;
use super::{ExecContext, Invocation};
use crate::error::{ShellError, ShellResult};
use crate::outcome::Outcome;
use crate::path::PathRef;
use crate::shell::Shell;

const DEFAULT_WIDTH: usize = 80;

impl Shell {
    pub(crate) async fn try_execute_fs_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> Option<ShellResult<()>> {
        match inv.name.as_str() {
            "ls" | "cat" | "touch" | "mkdir" | "rmdir" | "rm" | "cd" | "pwd" | "lcd" => {
                Some(self.dispatch_fs_builtin(inv, outcome, ctx).await)
            }
            _ => None,
        }
    }

    async fn dispatch_fs_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        match inv.name.as_str() {
            "ls" => self.cmd_ls(inv, outcome, ctx).await,
            "cat" => self.cmd_cat(inv, outcome, ctx).await,
            "touch" => self.cmd_touch(inv, outcome).await,
            "mkdir" => self.cmd_mkdir(inv, outcome).await,
            "rmdir" => self.cmd_rmdir(inv, outcome).await,
            "rm" => self.cmd_rm(inv, outcome, ctx).await,
            "cd" => self.cmd_cd(inv, outcome).await,
            "pwd" => ctx.out(&self.session.remote_cwd),
            "lcd" => self.cmd_lcd(inv, outcome, ctx).await,
            _ => unreachable!(),
        }
    }

    /// Operands, or the remote working directory when none were given.
    fn paths_or_cwd(&self, inv: &Invocation) -> Vec<PathRef> {
        if inv.words.is_empty() {
            vec![PathRef::Remote(self.session.remote_cwd.clone())]
        } else {
            inv.paths.clone()
        }
    }

    async fn cmd_ls(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let long = inv.flags.has('l');
        let recursive = inv.flags.has('R');
        let targets = self.paths_or_cwd(inv);

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for path in targets {
            match self.stat_path(&path).await {
                Ok(entry) if entry.is_dir => dirs.push(path),
                Ok(entry) => {
                    outcome.success(path.to_string());
                    files.push(entry);
                }
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => outcome.error(e),
            }
        }

        let headers = recursive || files.len() + dirs.len() > 1;
        let mut first = files.is_empty();
        if !files.is_empty() {
            self.print_entries(&files, long, ctx)?;
        }

        for dir in dirs {
            // Depth first, with each level's subdirectories in listing order.
            let mut stack = vec![(dir.clone(), dir.to_string())];
            let mut clean = true;
            while let Some((path, label)) = stack.pop() {
                let mut entries = match self.list_path(&path).await {
                    Ok(entries) => entries,
                    Err(e) if e.ends_line() => return Err(e),
                    Err(e) => {
                        outcome.error(e);
                        clean = false;
                        continue;
                    }
                };
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                if headers {
                    if !first {
                        ctx.out("")?;
                    }
                    ctx.out(&format!("{label}:"))?;
                }
                first = false;
                self.print_entries(&entries, long, ctx)?;
                if recursive {
                    for entry in entries.iter().rev().filter(|e| e.is_dir) {
                        stack.push((path.join(&entry.name), format!("{label}/{}", entry.name)));
                    }
                }
            }
            if clean {
                outcome.success(dir.to_string());
            }
        }
        Ok(())
    }

    fn print_entries(&self, entries: &[Entry], long: bool, ctx: &mut ExecContext) -> ShellResult<()> {
        if long {
            for entry in entries {
                ctx.out(&format!(
                    "{:>9} {} {}",
                    entry.size,
                    format_mtime(entry.mtime),
                    self.colour.file_name(&display_name(entry), entry.is_dir)
                ))?;
            }
            return Ok(());
        }
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_WIDTH);
        let names: Vec<String> = entries.iter().map(display_name).collect();
        for row in columnize(&names, width) {
            let line: String = row
                .iter()
                .map(|&(i, pad)| {
                    let painted = self.colour.file_name(&names[i], entries[i].is_dir);
                    format!("{painted}{}", " ".repeat(pad))
                })
                .collect();
            ctx.out(line.trim_end())?;
        }
        Ok(())
    }

    async fn cmd_cat(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        for path in &inv.paths {
            if self.is_dir(path).await? {
                outcome.fail(path.to_string(), "Is a directory");
                continue;
            }
            match self.read_file(path).await {
                Ok(data) => {
                    ctx.stdout.write(&data)?;
                    outcome.success(path.to_string());
                }
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => outcome.error(e),
            }
        }
        Ok(())
    }

    async fn cmd_touch(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        for path in &inv.paths {
            let result = self.touch_path(path).await;
            record(outcome, path, result)?;
        }
        Ok(())
    }

    async fn cmd_mkdir(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        let parents = inv.flags.has('p');
        for path in &inv.paths {
            let result = if parents {
                self.mkdir_parents(path).await
            } else {
                self.mkdir_path(path).await
            };
            record(outcome, path, result)?;
        }
        Ok(())
    }

    /// Create `path` and any missing ancestors; an existing directory is fine.
    async fn mkdir_parents(&mut self, path: &PathRef) -> ShellResult<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(path.clone());
        while let Some(p) = cursor {
            if self.exists(&p).await? {
                if !self.is_dir(&p).await? {
                    return Err(ShellError::Usage(format!("{p}: Not a directory")));
                }
                break;
            }
            cursor = p.parent();
            missing.push(p);
        }
        for p in missing.iter().rev() {
            self.mkdir_path(p).await?;
        }
        Ok(())
    }

    async fn cmd_rmdir(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        for path in &inv.paths {
            let result = self.rmdir_path(path).await;
            record(outcome, path, result)?;
        }
        Ok(())
    }

    async fn cmd_rm(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let recursive = inv.flags.has('r');
        let verbose = inv.flags.has('v');
        for path in &inv.paths {
            let entry = match self.stat_path(path).await {
                Ok(entry) => entry,
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    continue;
                }
            };
            if !entry.is_dir {
                self.remove_one(path, verbose, outcome, ctx).await?;
            } else if recursive {
                self.remove_tree(path, verbose, outcome, ctx).await?;
            } else {
                outcome.fail(path.to_string(), "Is a directory");
            }
        }
        Ok(())
    }

    async fn remove_one(
        &mut self,
        path: &PathRef,
        verbose: bool,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<bool> {
        match self.remove_path(path).await {
            Ok(()) => {
                if verbose {
                    ctx.out(&format!("removed '{path}'"))?;
                }
                outcome.success(path.to_string());
                Ok(true)
            }
            Err(e) if e.ends_line() => Err(e),
            Err(e) => {
                outcome.error(e);
                Ok(false)
            }
        }
    }

    /// Remove a directory tree bottom up. A directory is only removed once
    /// everything under it is gone, so a failure keeps its ancestors.
    fn remove_tree<'a>(
        &'a mut self,
        dir: &'a PathRef,
        verbose: bool,
        outcome: &'a mut Outcome,
        ctx: &'a mut ExecContext,
    ) -> Pin<Box<dyn Future<Output = ShellResult<bool>> + 'a>> {
        Box::pin(async move {
            let entries = match self.list_path(dir).await {
                Ok(entries) => entries,
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    return Ok(false);
                }
            };
            let mut clean = true;
            for entry in entries {
                let child = dir.join(&entry.name);
                let removed = if entry.is_dir {
                    self.remove_tree(&child, verbose, outcome, ctx).await?
                } else {
                    self.remove_one(&child, verbose, outcome, ctx).await?
                };
                clean &= removed;
            }
            if !clean {
                return Ok(false);
            }
            match self.rmdir_path(dir).await {
                Ok(()) => {
                    if verbose {
                        ctx.out(&format!("removed directory '{dir}'"))?;
                    }
                    outcome.success(dir.to_string());
                    Ok(true)
                }
                Err(e) if e.ends_line() => Err(e),
                Err(e) => {
                    outcome.error(e);
                    Ok(false)
                }
            }
        })
    }

    async fn cmd_cd(&mut self, inv: &Invocation, outcome: &mut Outcome) -> ShellResult<()> {
        if inv.paths.len() > 1 {
            return Err(ShellError::Usage("too many arguments".to_string()));
        }
        let target = inv
            .paths
            .first()
            .cloned()
            .unwrap_or_else(|| PathRef::Remote("/".to_string()));

        let entry = self.stat_path(&target).await?;
        if !entry.is_dir {
            outcome.fail(target.to_string(), "Not a directory");
            return Ok(());
        }
        match &target {
            PathRef::Remote(p) => {
                self.board.chdir(p).await?;
                self.session.remote_cwd.clone_from(p);
            }
            PathRef::Local(p) => self.session.local_cwd.clone_from(p),
        }
        tracing::debug!(cwd = %target, "changed directory");
        outcome.success(target.to_string());
        Ok(())
    }

    async fn cmd_lcd(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let Some(target) = inv.paths.first() else {
            return ctx.out(&self.session.local_cwd.display().to_string());
        };
        if inv.paths.len() > 1 {
            return Err(ShellError::Usage("too many arguments".to_string()));
        }
        if !self.stat_path(target).await?.is_dir {
            outcome.fail(target.to_string(), "Not a directory");
            return Ok(());
        }
        if let PathRef::Local(p) = target {
            self.session.local_cwd.clone_from(p);
            outcome.success(target.to_string());
        }
        Ok(())
    }
}

/// Record a per-operand result; only line-ending errors propagate.
pub(super) fn record(outcome: &mut Outcome, path: &PathRef, result: ShellResult<()>) -> ShellResult<()> {
    match result {
        Ok(()) => {
            outcome.success(path.to_string());
            Ok(())
        }
        Err(e) if e.ends_line() => Err(e),
        Err(e) => {
            outcome.error(e);
            Ok(())
        }
    }
}

fn display_name(entry: &Entry) -> String {
    if entry.is_dir {
        format!("{}/", entry.name)
    } else {
        entry.name.clone()
    }
}

fn format_mtime(mtime: i64) -> String {
    DateTime::from_timestamp(mtime, 0)
        .map_or_else(|| " ".repeat(12), |t| t.format("%b %e %H:%M").to_string())
}

/// Lay names out in columns, filled top to bottom like `ls`. Each cell is
/// an index into `names` plus the padding that follows it.
fn columnize(names: &[String], width: usize) -> Vec<Vec<(usize, usize)>> {
    if names.is_empty() {
        return Vec::new();
    }
    let col_width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0) + 2;
    let cols = (width / col_width).max(1);
    let rows = names.len().div_ceil(cols);
    (0..rows)
        .map(|row| {
            (0..cols)
                .map(|col| col * rows + row)
                .filter(|&i| i < names.len())
                .map(|i| (i, col_width - names[i].chars().count()))
                .collect()
        })
        .collect()
}
