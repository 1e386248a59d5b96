//! Raw REPL channel
//!
//! Drives the MicroPython raw REPL over any byte stream. The channel owns all
//! raw-mode transitions: callers either run a single snippet (raw mode is
//! entered and left around it) or bracket a batch with [`Channel::hold`] /
//! [`Channel::release`] so the board stays in raw mode for the whole batch.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;
use crate::types::{Interaction, RawMode, Reply};

const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
const SOFT_REBOOT: &[u8] = b"soft reboot\r\n";
const FRIENDLY_PROMPT: &[u8] = b">>> ";
const CONTINUATION_PROMPT: &[u8] = b"... ";
const INTERRUPT: &[u8] = b"\r\x03\x03";
const ENTER_RAW: &[u8] = b"\r\x01";
const EXIT_RAW: &[u8] = b"\r\x02";
const EOT: u8 = 0x04;

/// Bytes written per burst; small boards drop input on larger writes.
const WRITE_CHUNK: usize = 256;

/// Silence that marks the end of stale output after an interrupt.
const DRAIN_QUIET: Duration = Duration::from_millis(50);

/// Any duplex byte stream a board can be reached over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub struct Channel<T> {
    io: T,
    timeout: Duration,
    pending: Vec<u8>,
    raw: bool,
    holds: usize,
    needs_resync: bool,
}

type Result<T> = std::result::Result<T, ChannelError>;

impl<T: Transport> Channel<T> {
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            io,
            timeout,
            pending: Vec::new(),
            raw: false,
            holds: 0,
            needs_resync: false,
        }
    }

    pub const fn mode(&self) -> RawMode {
        if self.raw {
            RawMode::RawEval
        } else {
            RawMode::Interactive
        }
    }

    pub const fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Execute `code` in raw mode and collect its stdout and stderr.
    pub async fn run(&mut self, code: &str) -> Result<Reply> {
        self.ensure_raw().await?;
        let result = self.exec_raw(code).await;
        if self.holds == 0 && self.raw && !self.needs_resync {
            if let Err(e) = self.exit_raw().await {
                if e.is_fatal() {
                    return Err(e);
                }
                // Keep the reply; the next call resynchronizes.
                tracing::warn!(error = %e, "failed to leave raw mode");
                self.needs_resync = true;
            }
        }
        result
    }

    /// Keep the board in raw mode until the matching [`Channel::release`].
    pub async fn hold(&mut self) -> Result<()> {
        self.holds += 1;
        if let Err(e) = self.ensure_raw().await {
            self.holds -= 1;
            return Err(e);
        }
        Ok(())
    }

    pub async fn release(&mut self) -> Result<()> {
        self.holds = self.holds.saturating_sub(1);
        if self.holds == 0 && self.raw && !self.needs_resync {
            self.exit_raw().await?;
        }
        Ok(())
    }

    /// Forward one line to the friendly REPL and wait for its next prompt.
    pub async fn interact(&mut self, line: &str) -> Result<Interaction> {
        if self.needs_resync {
            self.recover_friendly().await?;
        } else if self.raw {
            self.exit_raw().await?;
        }
        self.write_all(line.as_bytes()).await?;
        self.write_all(b"\r").await?;
        let (data, prompt) = self
            .read_until_any(&[FRIENDLY_PROMPT, CONTINUATION_PROMPT])
            .await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        // The REPL echoes the line back before any output.
        let output = match text.split_once("\r\n") {
            Some((echo, rest)) if echo.trim_end() == line.trim_end() => rest.to_string(),
            _ => text,
        };
        Ok(Interaction {
            output,
            prompt: String::from_utf8_lossy(prompt).into_owned(),
        })
    }

    /// Stop whatever the board is running and return it to the friendly
    /// REPL. Outstanding holds are dropped.
    ///
    /// If the board does not answer, the channel is left marked for resync
    /// and the error is returned.
    pub async fn interrupt(&mut self) -> Result<()> {
        tracing::debug!("sending interrupt");
        self.holds = 0;
        self.recover_friendly().await
    }

    /// Restart the runtime, clearing its heap and imported modules.
    pub async fn soft_reset(&mut self) -> Result<()> {
        self.ensure_raw().await?;
        self.write_all(&[EOT]).await?;
        self.read_until(SOFT_REBOOT).await?;
        self.read_until(RAW_BANNER).await?;
        if self.holds == 0 {
            self.exit_raw().await?;
        }
        Ok(())
    }

    async fn ensure_raw(&mut self) -> Result<()> {
        if self.needs_resync {
            tracing::warn!("resynchronizing with device");
            self.raw = false;
            self.pending.clear();
        }
        if !self.raw {
            self.enter_raw().await?;
        }
        Ok(())
    }

    /// Ctrl-C, then Ctrl-B, then wait for `>>> ` and discard anything that
    /// trails it. Works from raw mode, friendly mode or a running program.
    async fn recover_friendly(&mut self) -> Result<()> {
        self.needs_resync = true;
        self.raw = false;
        self.pending.clear();
        self.write_all(INTERRUPT).await?;
        self.write_all(EXIT_RAW).await?;
        self.read_until(FRIENDLY_PROMPT).await?;
        self.drain().await?;
        self.needs_resync = false;
        Ok(())
    }

    /// Read until the board has been quiet for a moment, then drop it all.
    async fn drain(&mut self) -> Result<()> {
        let quiet = DRAIN_QUIET.min(self.timeout);
        let mut buf = [0u8; 512];
        loop {
            match tokio::time::timeout(quiet, self.io.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(ChannelError::Disconnected),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(ChannelError::Io(e)),
            }
        }
        self.pending.clear();
        Ok(())
    }

    async fn enter_raw(&mut self) -> Result<()> {
        self.write_all(INTERRUPT).await?;
        self.write_all(ENTER_RAW).await?;
        self.read_until(RAW_BANNER).await?;
        self.raw = true;
        self.needs_resync = false;
        Ok(())
    }

    async fn exit_raw(&mut self) -> Result<()> {
        self.write_all(EXIT_RAW).await?;
        self.raw = false;
        self.read_until(FRIENDLY_PROMPT).await?;
        Ok(())
    }

    async fn exec_raw(&mut self, code: &str) -> Result<Reply> {
        tracing::debug!(len = code.len(), "exec");
        for chunk in code.as_bytes().chunks(WRITE_CHUNK) {
            self.write_all(chunk).await?;
        }
        self.write_all(&[EOT]).await?;

        let ack = self.read_exact(2).await?;
        if ack != b"OK" {
            self.needs_resync = true;
            return Err(ChannelError::Protocol(format!(
                "expected OK, got {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }
        let output = self.read_until(&[EOT]).await?;
        let error = self.read_until(&[EOT]).await?;
        self.read_until(b">").await?;

        Ok(Reply {
            output: String::from_utf8_lossy(&output).into_owned(),
            error: String::from_utf8_lossy(&error).into_owned(),
        })
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await?;
        Ok(())
    }

    async fn fill(&mut self) -> Result<()> {
        let mut buf = [0u8; 512];
        match tokio::time::timeout(self.timeout, self.io.read(&mut buf)).await {
            Err(_) => {
                self.needs_resync = true;
                Err(ChannelError::Timeout(self.timeout))
            }
            Ok(Ok(0)) => Err(ChannelError::Disconnected),
            Ok(Ok(n)) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Ok(Err(e)) => Err(ChannelError::Io(e)),
        }
    }

    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        while self.pending.len() < n {
            self.fill().await?;
        }
        Ok(self.pending.drain(..n).collect())
    }

    /// Bytes preceding `marker`; the marker itself is consumed.
    async fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>> {
        self.read_until_any(&[marker]).await.map(|(data, _)| data)
    }

    async fn read_until_any<'m>(&mut self, markers: &[&'m [u8]]) -> Result<(Vec<u8>, &'m [u8])> {
        loop {
            let hit = markers
                .iter()
                .filter_map(|m| find(&self.pending, m).map(|pos| (pos, *m)))
                .min_by_key(|(pos, _)| *pos);
            if let Some((pos, marker)) = hit {
                let data = self.pending[..pos].to_vec();
                self.pending.drain(..pos + marker.len());
                return Ok((data, marker));
            }
            self.fill().await?;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
pub(crate) mod fake {
    //! A scripted board speaking the raw REPL protocol over an in-memory pipe.

    use std::collections::HashMap;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    pub struct Script {
        /// Snippet text to (stdout, stderr).
        pub replies: HashMap<String, (String, String)>,
        /// Friendly-mode line to printed output.
        pub lines: HashMap<String, String>,
    }

    pub fn spawn(script: Script) -> DuplexStream {
        let (host, mut board) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut raw = false;
            let mut code = Vec::new();
            let mut line = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = match board.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let mut out = Vec::new();
                for &b in &buf[..n] {
                    match b {
                        0x01 => {
                            raw = true;
                            code.clear();
                            out.extend_from_slice(b"raw REPL; CTRL-B to exit\r\n>");
                        }
                        0x02 => {
                            raw = false;
                            out.extend_from_slice(b"\r\nMicroPython v1.22.0; fake\r\n>>> ");
                        }
                        0x03 => code.clear(),
                        0x04 if raw && code.is_empty() => {
                            out.extend_from_slice(b"soft reboot\r\nraw REPL; CTRL-B to exit\r\n>");
                        }
                        0x04 if raw => {
                            let text = String::from_utf8_lossy(&code).into_owned();
                            code.clear();
                            let (stdout, stderr) = script
                                .replies
                                .get(&text)
                                .cloned()
                                .unwrap_or_default();
                            out.extend_from_slice(b"OK");
                            out.extend_from_slice(stdout.as_bytes());
                            out.push(0x04);
                            out.extend_from_slice(stderr.as_bytes());
                            out.extend_from_slice(b"\x04>");
                        }
                        b'\r' if !raw => {
                            let text = String::from_utf8_lossy(&line).into_owned();
                            line.clear();
                            out.extend_from_slice(text.as_bytes());
                            out.extend_from_slice(b"\r\n");
                            if let Some(printed) = script.lines.get(&text) {
                                out.extend_from_slice(printed.as_bytes());
                            }
                            if text.ends_with(':') {
                                out.extend_from_slice(b"... ");
                            } else {
                                out.extend_from_slice(b">>> ");
                            }
                        }
                        b'\r' => {}
                        _ if raw => code.push(b),
                        _ => line.push(b),
                    }
                }
                if board.write_all(&out).await.is_err() {
                    return;
                }
            }
        });
        host
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::fake::{spawn, Script};
    use super::*;

    fn script(replies: &[(&str, &str, &str)]) -> Script {
        Script {
            replies: replies
                .iter()
                .map(|(code, out, err)| ((*code).to_string(), ((*out).to_string(), (*err).to_string())))
                .collect(),
            lines: HashMap::from([("1+1".to_string(), "2\r\n".to_string())]),
        }
    }

    #[tokio::test]
    async fn run_collects_output_and_leaves_raw_mode() {
        let io = spawn(script(&[("print(42)", "42\r\n", "")]));
        let mut channel = Channel::new(io, Duration::from_secs(2));

        let reply = channel.run("print(42)").await.unwrap();
        assert_eq!(reply.output, "42\r\n");
        assert!(!reply.failed());
        assert_eq!(channel.mode(), RawMode::Interactive);
    }

    #[tokio::test]
    async fn raised_error_is_captured_as_text() {
        let io = spawn(script(&[(
            "1/0",
            "",
            "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1\r\nZeroDivisionError: divide by zero\r\n",
        )]));
        let mut channel = Channel::new(io, Duration::from_secs(2));

        let reply = channel.run("1/0").await.unwrap();
        assert!(reply.failed());
        assert_eq!(reply.error_summary(), "ZeroDivisionError: divide by zero");
    }

    #[tokio::test]
    async fn hold_keeps_raw_mode_across_runs() {
        let io = spawn(script(&[("a", "1", ""), ("b", "2", "")]));
        let mut channel = Channel::new(io, Duration::from_secs(2));

        channel.hold().await.unwrap();
        channel.hold().await.unwrap();
        assert_eq!(channel.run("a").await.unwrap().output, "1");
        assert_eq!(channel.mode(), RawMode::RawEval);
        channel.release().await.unwrap();
        assert_eq!(channel.run("b").await.unwrap().output, "2");
        assert_eq!(channel.mode(), RawMode::RawEval);
        channel.release().await.unwrap();
        assert_eq!(channel.mode(), RawMode::Interactive);
    }

    #[tokio::test]
    async fn interact_strips_echo() {
        let io = spawn(script(&[]));
        let mut channel = Channel::new(io, Duration::from_secs(2));

        let reply = channel.interact("1+1").await.unwrap();
        assert_eq!(reply.output, "2\r\n");
        assert_eq!(reply.prompt, ">>> ");

        let reply = channel.interact("for i in x:").await.unwrap();
        assert_eq!(reply.prompt, "... ");
    }

    #[tokio::test]
    async fn soft_reset_returns_to_friendly_prompt() {
        let io = spawn(script(&[]));
        let mut channel = Channel::new(io, Duration::from_secs(2));

        channel.soft_reset().await.unwrap();
        assert_eq!(channel.mode(), RawMode::Interactive);
    }

    #[tokio::test]
    async fn silent_device_times_out_and_requests_resync() {
        let (host, _board) = tokio::io::duplex(1024);
        let mut channel = Channel::new(host, Duration::from_millis(50));

        let err = channel.run("print(1)").await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert!(channel.needs_resync());
    }

    #[tokio::test]
    async fn interrupt_returns_board_to_friendly_repl() {
        let io = spawn(script(&[]));
        let mut channel = Channel::new(io, Duration::from_millis(300));

        channel.hold().await.unwrap();
        assert_eq!(channel.mode(), RawMode::RawEval);
        channel.interrupt().await.unwrap();
        assert_eq!(channel.mode(), RawMode::Interactive);
        assert!(!channel.needs_resync());

        let reply = channel.interact("1+1").await.unwrap();
        assert_eq!(reply.output, "2\r\n");
        assert_eq!(reply.prompt, ">>> ");
    }

    #[tokio::test]
    async fn interact_recovers_after_timeout() {
        let io = spawn(script(&[]));
        let mut channel = Channel::new(io, Duration::from_millis(300));

        channel.hold().await.unwrap();
        // The fake never answers a bare newline in raw mode.
        channel.write_all(b"\r").await.unwrap();
        let err = channel.read_until(b"never").await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert!(channel.needs_resync());

        let reply = channel.interact("1+1").await.unwrap();
        assert_eq!(reply.output, "2\r\n");
    }

    #[tokio::test]
    async fn reply_survives_failed_exit_from_raw_mode() {
        // Answers raw-mode requests but never leaves raw mode.
        let (host, mut board) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let n = match board.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let mut out = Vec::new();
                for &b in &buf[..n] {
                    match b {
                        0x01 => out.extend_from_slice(b"raw REPL; CTRL-B to exit\r\n>"),
                        0x04 => out.extend_from_slice(b"OK42\r\n\x04\x04>"),
                        _ => {}
                    }
                }
                if board.write_all(&out).await.is_err() {
                    return;
                }
            }
        });
        let mut channel = Channel::new(host, Duration::from_millis(100));

        let reply = channel.run("print(42)").await.unwrap();
        assert_eq!(reply.output, "42\r\n");
        assert!(channel.needs_resync());
    }

    #[tokio::test]
    async fn closed_transport_is_a_disconnect() {
        let (host, board) = tokio::io::duplex(1024);
        drop(board);
        let mut channel = Channel::new(host, Duration::from_millis(50));

        let err = channel.run("print(1)").await.unwrap_err();
        assert!(err.is_fatal());
    }
}
