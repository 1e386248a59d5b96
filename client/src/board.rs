use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::codec::{self, Value};
use crate::error::{DeviceError, Result};
use crate::types::{DeviceInfo, FsUsage, Interaction, MemInfo, RawMode, RemoteEntry, Reply};

/// Code execution on the board's runtime.
#[async_trait]
pub trait Evaluator: Send {
    /// Run a snippet in raw mode. A raised exception is reported in
    /// [`Reply::error`], not as an `Err`.
    async fn run(&mut self, code: &str) -> Result<Reply>;

    /// Run a snippet and return its stdout, failing if it raised.
    async fn exec(&mut self, code: &str) -> Result<String> {
        let reply = self.run(code).await?;
        if reply.failed() {
            return Err(DeviceError::Raised(reply.error_summary()));
        }
        Ok(reply.output)
    }

    /// Evaluate an expression and decode the printed representation.
    async fn eval(&mut self, expr: &str) -> Result<Value> {
        let output = self.exec(&format!("print(repr({expr}))")).await?;
        Ok(codec::decode(output.trim())?)
    }

    async fn interact(&mut self, line: &str) -> Result<Interaction>;

    async fn hold(&mut self) -> Result<()>;

    async fn release(&mut self) -> Result<()>;

    async fn interrupt(&mut self) -> Result<()>;

    async fn soft_reset(&mut self) -> Result<()>;

    fn mode(&self) -> RawMode;
}

/// The board's filesystem, addressed by absolute remote paths.
#[async_trait]
pub trait RemoteFs: Send {
    async fn stat(&mut self, path: &str) -> Result<RemoteEntry>;

    /// Entries of a directory in the order the filesystem returns them.
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn mkdir(&mut self, path: &str) -> Result<()>;

    async fn rmdir(&mut self, path: &str) -> Result<()>;

    async fn remove(&mut self, path: &str) -> Result<()>;

    async fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// File to file copy performed on the board.
    async fn copy_file(&mut self, from: &str, to: &str) -> Result<()>;

    /// Create an empty file, leaving an existing one untouched.
    async fn touch(&mut self, path: &str) -> Result<()>;

    async fn read_chunk(&mut self, path: &str, offset: u64, len: usize) -> Result<Bytes>;

    /// Offset zero truncates the file; any other offset appends.
    async fn write_chunk(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Align the runtime's own working directory.
    async fn chdir(&mut self, path: &str) -> Result<()>;

    async fn statvfs(&mut self, path: &str) -> Result<FsUsage>;

    async fn rtc_now(&mut self) -> Result<NaiveDateTime>;

    async fn rtc_set(&mut self, time: NaiveDateTime) -> Result<()>;
}

/// A connected board: evaluator, filesystem and runtime introspection.
#[async_trait]
pub trait Board: Evaluator + RemoteFs {
    async fn info(&mut self) -> Result<DeviceInfo>;

    /// Heap usage, optionally running a collection first.
    async fn mem_info(&mut self, collect: bool) -> Result<MemInfo>;
}
