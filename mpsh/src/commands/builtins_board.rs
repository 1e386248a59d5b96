use chrono::{Local, NaiveDateTime, Utc};
use mpsh_client::{Board, DeviceError, Evaluator, RemoteFs};

use super::builtins_fs::record;
use super::{ExecContext, Invocation};
use crate::error::{ShellError, ShellResult};
use crate::outcome::Outcome;
use crate::path::PathRef;
use crate::prompt;
use crate::shell::Shell;

impl Shell {
    pub(crate) async fn try_execute_board_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> Option<ShellResult<()>> {
        match inv.name.as_str() {
            "eval" | "exec" | "run" | "echo" | "time" | "df" | "free" | "gc" | "uname"
            | "reset" | "mount" | "umount" => {
                Some(self.dispatch_board_builtin(inv, outcome, ctx).await)
            }
            _ => None,
        }
    }

    async fn dispatch_board_builtin(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        match inv.name.as_str() {
            "eval" => self.cmd_eval(inv, ctx).await,
            "exec" => self.cmd_exec(inv, ctx).await,
            "run" => self.cmd_run(inv, outcome, ctx).await,
            "echo" => self.cmd_echo(inv, ctx).await,
            "time" => self.cmd_time(inv, ctx).await,
            "df" => self.cmd_df(inv, outcome, ctx).await,
            "free" => self.cmd_free(false, ctx).await,
            "gc" => self.cmd_free(true, ctx).await,
            "uname" => {
                let info = self.board.info().await?;
                ctx.out(&info.to_string())
            }
            "reset" => self.cmd_reset(ctx).await,
            "mount" => self.cmd_mount(inv, outcome, ctx).await,
            "umount" => self.cmd_umount(ctx),
            _ => unreachable!(),
        }
    }

    async fn cmd_eval(&mut self, inv: &Invocation, ctx: &mut ExecContext) -> ShellResult<()> {
        let expr = inv.text();
        if expr.trim().is_empty() {
            return Err(ShellError::Usage("eval: missing expression".to_string()));
        }
        match self.board.eval(&expr).await {
            Ok(value) => ctx.out(&value.pretty()),
            // Objects without a literal repr are shown as printed.
            Err(DeviceError::Decode(e)) => ctx.out(&e.raw),
            Err(e) => Err(e.into()),
        }
    }

    async fn cmd_exec(&mut self, inv: &Invocation, ctx: &mut ExecContext) -> ShellResult<()> {
        let code = unescape_newlines(&inv.text());
        let output = self.board.exec(&code).await?;
        ctx.stdout.write(output.as_bytes())?;
        Ok(())
    }

    async fn cmd_run(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        for path in &inv.paths {
            let code = match self.read_file(path).await {
                Ok(data) => String::from_utf8_lossy(&data).into_owned(),
                Err(e) if e.ends_line() => return Err(e),
                Err(e) => {
                    outcome.error(e);
                    continue;
                }
            };
            let reply = self.board.run(&code).await?;
            ctx.stdout.write(reply.output.as_bytes())?;
            if reply.failed() {
                ctx.stderr.write(reply.error.as_bytes())?;
                outcome.fail(path.to_string(), reply.error_summary());
            } else {
                outcome.success(path.to_string());
            }
        }
        Ok(())
    }

    /// Print text with prompt placeholders filled in.
    async fn cmd_echo(&mut self, inv: &Invocation, ctx: &mut ExecContext) -> ShellResult<()> {
        let text = inv.text();
        let params = self.prompt_params(&text).await?;
        let rendered = prompt::render(&text, &params, &self.session.options.missing);
        if inv.flags.has('n') {
            ctx.stdout.write(rendered.as_bytes())?;
            Ok(())
        } else {
            ctx.out(&rendered)
        }
    }

    /// `time` shows the board clock; `time set [utc]` sets it from the host.
    async fn cmd_time(&mut self, inv: &Invocation, ctx: &mut ExecContext) -> ShellResult<()> {
        let args: Vec<&str> = inv.words.iter().map(|w| w.text.as_str()).collect();
        let now: NaiveDateTime = match args.as_slice() {
            [] => {
                let now = self.board.rtc_now().await?;
                return ctx.out(&now.format("%Y-%m-%d %H:%M:%S").to_string());
            }
            ["set"] => Local::now().naive_local(),
            ["set", "utc"] => Utc::now().naive_utc(),
            _ => return Err(ShellError::Usage("usage: time [set [utc]]".to_string())),
        };
        self.board.rtc_set(now).await?;
        tracing::info!(time = %now, "board clock set");
        ctx.out(&format!("board clock set to {}", now.format("%Y-%m-%d %H:%M:%S")))
    }

    async fn cmd_df(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let paths = if inv.words.is_empty() {
            vec![PathRef::Remote("/".to_string())]
        } else {
            inv.paths.clone()
        };
        ctx.out(&format!(
            "{:>10} {:>10} {:>10} {:>5}  Mounted on",
            "Size", "Used", "Avail", "Use%"
        ))?;
        for path in &paths {
            let PathRef::Remote(p) = path else {
                outcome.fail(path.to_string(), "not a board filesystem");
                continue;
            };
            let usage = match self.board.statvfs(p).await {
                Ok(usage) => usage,
                Err(e) => {
                    record(outcome, path, Err(e.into()))?;
                    continue;
                }
            };
            ctx.out(&format!(
                "{:>10} {:>10} {:>10} {:>4}%  {p}",
                usage.total_bytes(),
                usage.used_bytes(),
                usage.free_bytes(),
                percent(usage.used_bytes(), usage.total_bytes())
            ))?;
            outcome.success(path.to_string());
        }
        Ok(())
    }

    async fn cmd_free(&mut self, collect: bool, ctx: &mut ExecContext) -> ShellResult<()> {
        let mem = self.board.mem_info(collect).await?;
        if collect {
            ctx.out(&format!(
                "collected {} bytes",
                mem.free.saturating_sub(mem.free_before)
            ))?;
        }
        ctx.out(&format!(
            "free: {} used: {} total: {} ({}% free)",
            mem.free,
            mem.alloc,
            mem.total(),
            percent(mem.free, mem.total())
        ))
    }

    async fn cmd_reset(&mut self, ctx: &mut ExecContext) -> ShellResult<()> {
        self.board.soft_reset().await?;
        // The runtime starts over in its root directory.
        self.session.remote_cwd = "/".to_string();
        ctx.out("soft reset")
    }

    async fn cmd_mount(
        &mut self,
        inv: &Invocation,
        outcome: &mut Outcome,
        ctx: &mut ExecContext,
    ) -> ShellResult<()> {
        let Some(path) = inv.paths.first() else {
            return match &self.session.mounted {
                Some(src) => ctx.out(&format!("{} on {}", src.display(), crate::path::MOUNT_POINT)),
                None => ctx.out("nothing mounted"),
            };
        };
        if inv.paths.len() > 1 {
            return Err(ShellError::Usage("mount: too many arguments".to_string()));
        }
        let PathRef::Local(dir) = path else {
            outcome.fail(path.to_string(), "not a local directory");
            return Ok(());
        };
        if !self.is_dir(path).await? {
            outcome.fail(path.to_string(), "Not a directory");
            return Ok(());
        }
        tracing::info!(source = %dir.display(), "mounted");
        self.session.mounted = Some(dir.clone());
        outcome.success(path.to_string());
        Ok(())
    }

    fn cmd_umount(&mut self, ctx: &mut ExecContext) -> ShellResult<()> {
        match self.session.mounted.take() {
            Some(src) => ctx.out(&format!("unmounted {}", src.display())),
            None => Err(ShellError::Usage("umount: nothing mounted".to_string())),
        }
    }
}

/// Turn typed `\n` sequences into newlines so one line can hold a block.
fn unescape_newlines(code: &str) -> String {
    code.replace("\\n", "\n")
}

fn percent(part: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        part * 100 / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_newlines() {
        assert_eq!(unescape_newlines("for i in range(2):\\n  print(i)"), "for i in range(2):\n  print(i)");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(25, 100), 25);
        assert_eq!(percent(1, 0), 0);
    }
}
