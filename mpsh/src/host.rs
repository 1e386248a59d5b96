//! The local machine: shell escapes and the editor.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait Host: Send {
    /// Run `command` through the local shell in `cwd` and return its exit code.
    async fn run_shell(&mut self, command: &str, cwd: &Path) -> std::io::Result<i32>;

    /// Open `path` in the editor and wait for it to exit.
    async fn edit(&mut self, path: &Path) -> std::io::Result<i32>;
}

/// Runs commands on this machine, with the terminal attached.
#[derive(Debug, Clone)]
pub struct SystemHost {
    editor: String,
}

impl SystemHost {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[async_trait]
impl Host for SystemHost {
    async fn run_shell(&mut self, command: &str, cwd: &Path) -> std::io::Result<i32> {
        tracing::debug!(command, cwd = %cwd.display(), "local shell");
        let status = shell_command(command).current_dir(cwd).status().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn edit(&mut self, path: &Path) -> std::io::Result<i32> {
        // The editor setting may carry its own arguments.
        let command = format!("{} {}", self.editor, crate::lexer::quote(&path.to_string_lossy()));
        let cwd = path.parent().unwrap_or_else(|| Path::new("."));
        self.run_shell(&command, cwd).await
    }
}
