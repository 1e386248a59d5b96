//! Copying between and within the two filesystems: `cp`, `mv`, `put`, `get`.
//!
//! `put` only ever writes to the board and `get` only ever writes to the
//! local filesystem, whatever markers the operands carry.

use super::builtins_fs::record;
use super::{ExecContext, Invocation};
use crate::error::{ShellError, ShellResult};
use crate::outcome::Outcome;
use crate::path::{Domain, PathRef};
use crate::shell::Shell;

#[derive(Debug, Clone, Copy, Default)]
struct TransferOpts {
    recursive: bool,
    verbose: bool,
    dry_run: bool,
    /// Copy from one side of the link to the other.
    across: bool,
}

impl TransferOpts {
    fn from_invocation(inv: &Invocation) -> Self {
        Self {
            recursive: inv.flags.has('r'),
            verbose: inv.flags.has('v') || inv.flags.has('n'),
            dry_run: inv.flags.has('n'),
            across: false,
        }
    }
}

impl Shell {
    pub(crate) async fn try_execute_transfer_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> Option<ShellResult<()>> {
        match inv.name.as_str() {
            "cp" | "mv" | "put" | "get" => {
                Some(self.dispatch_transfer_builtin(inv, outcome, ctx).await)
            }
            _ => None,
        }
    }

    async fn dispatch_transfer_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        match inv.name.as_str() {
            "cp" => self.cmd_cp(inv, outcome, ctx).await,
            "mv" => self.cmd_mv(inv, outcome, ctx).await,
            "put" => self.cmd_transfer(inv, Domain::Local, outcome, ctx).await,
            "get" => self.cmd_transfer(inv, Domain::Remote, outcome, ctx).await,
            _ => unreachable!(),
        }
    }

    async fn cmd_cp(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let dest = destination(inv)?;
        let opts = TransferOpts::from_invocation(inv);
        for (source, target) in self.plan_targets(&inv.paths, &dest).await? {
            self.copy_entry(&source, &target, opts, outcome, ctx).await?;
        }
        Ok(())
    }

    async fn cmd_mv(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let dest = destination(inv)?;
        let verbose = inv.flags.has('v');
        for (source, target) in self.plan_targets(&inv.paths, &dest).await? {
            if target != source && target.starts_with(&source) {
                outcome.fail(source.to_string(), "cannot move a directory into itself");
                continue;
            }
            let result = self.rename_path(&source, &target).await;
            if verbose && result.is_ok() {
                ctx.out(&format!("renamed '{source}' -> '{target}'"))?;
            }
            record(outcome, &source, result)?;
        }
        Ok(())
    }

    /// `put` (from local) and `get` (from the board).
    async fn cmd_transfer(
        &mut self,
        inv: &Invocation,
        from: Domain,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let dest = match &inv.dest {
            Some(dest) => dest.clone(),
            None => match from {
                Domain::Local => PathRef::Remote(self.session.remote_cwd.clone()),
                Domain::Remote => PathRef::Local(self.session.local_cwd.clone()),
            },
        };
        if dest.domain() == from {
            return Err(ShellError::DomainMismatch(format!(
                "{}: destination {dest} is not on the {} side",
                inv.name,
                side_name(from.other())
            )));
        }

        let mut sources = Vec::with_capacity(inv.paths.len());
        for source in &inv.paths {
            if source.domain() == from {
                sources.push(source.clone());
            } else {
                outcome.fail(source.to_string(), format!("not a {} path", side_name(from)));
            }
        }
        if sources.is_empty() {
            return Ok(());
        }

        let opts = TransferOpts {
            across: true,
            ..TransferOpts::from_invocation(inv)
        };
        tracing::debug!(command = %inv.name, sources = sources.len(), %dest, "transfer");
        for (source, target) in self.plan_targets(&sources, &dest).await? {
            self.copy_entry(&source, &target, opts, outcome, ctx).await?;
        }
        Ok(())
    }

    /// Pair every source with where it lands. An existing directory takes
    /// the sources by name; anything else must be a single file's target.
    async fn plan_targets(
        &mut self,
        sources: &[PathRef],
        dest: &PathRef,
    ) -> ShellResult<Vec<(PathRef, PathRef)>> {
        let into_dir = self.is_dir(dest).await?;
        if !into_dir && sources.len() > 1 {
            return Err(ShellError::Usage(format!("target '{dest}' is not a directory")));
        }
        Ok(sources
            .iter()
            .map(|source| {
                let target = match source.file_name() {
                    Some(name) if into_dir => dest.join(&name),
                    _ => dest.clone(),
                };
                (source.clone(), target)
            })
            .collect())
    }

    async fn copy_entry(
        &mut self,
        source: &PathRef,
        target: &PathRef,
        opts: TransferOpts,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let entry = match self.stat_path(source).await {
            Ok(entry) => entry,
            Err(e) if e.ends_line() => return Err(e),
            Err(e) => {
                outcome.error(e);
                return Ok(());
            }
        };
        if !entry.is_dir {
            self.copy_one(source, target, opts, outcome, ctx).await?;
            return Ok(());
        }
        if !opts.recursive {
            outcome.fail(source.to_string(), "-r not specified; omitting directory");
        } else if target.starts_with(source) {
            outcome.fail(source.to_string(), "cannot copy a directory into itself");
        } else {
            self.copy_tree(source, target, opts, outcome, ctx).await?;
        }
        Ok(())
    }

    async fn copy_one(
        &mut self,
        source: &PathRef,
        target: &PathRef,
        opts: TransferOpts,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<bool> {
        if opts.verbose {
            ctx.out(&format!("'{source}' -> '{target}'"))?;
        }
        if opts.dry_run {
            return Ok(true);
        }
        let result = if opts.across {
            self.transfer_file(source, target).await
        } else {
            self.copy_file_path(source, target).await
        };
        let ok = result.is_ok();
        record(outcome, source, result)?;
        Ok(ok)
    }

    /// Copy a directory tree. The whole directory structure is created
    /// before any file is copied.
    async fn copy_tree(
        &mut self,
        source: &PathRef,
        target: &PathRef,
        opts: TransferOpts,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<bool> {
        let mut dirs = vec![(source.clone(), target.clone())];
        let mut files = Vec::new();
        let mut stack = dirs.clone();
        let mut clean = true;
        while let Some((from, to)) = stack.pop() {
            let entries = match self.list_path(&from).await {
                Ok(entries) => entries,
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    clean = false;
                    continue;
                }
            };
            for entry in entries {
                let pair = (from.join(&entry.name), to.join(&entry.name));
                if entry.is_dir {
                    dirs.push(pair.clone());
                    stack.push(pair);
                } else {
                    files.push(pair);
                }
            }
        }

        for (_, to) in &dirs {
            if opts.verbose {
                ctx.out(&format!("mkdir '{to}'"))?;
            }
            if opts.dry_run || self.is_dir(to).await? {
                continue;
            }
            match self.mkdir_path(to).await {
                Ok(()) => {}
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    return Ok(false);
                }
            }
        }
        for (from, to) in &files {
            clean &= self.copy_one(from, to, opts, outcome, ctx).await?;
        }
        Ok(clean)
    }
}

fn destination(inv: &Invocation) -> ShellResult<PathRef> {
    inv.dest
        .clone()
        .ok_or_else(|| ShellError::Usage(format!("{}: missing destination", inv.name)))
}

const fn side_name(domain: Domain) -> &'static str {
    match domain {
        Domain::Local => "local",
        Domain::Remote => "board",
    }
}
