use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tokio_serial::SerialPortBuilderExt;

use crate::board::{Board, Evaluator, RemoteFs};
use crate::channel::{Channel, Transport};
use crate::codec::{encode, Value};
use crate::error::{DeviceError, FsErrorKind, RemoteFsError, Result};
use crate::types::{
    DeviceInfo, EntryKind, FsUsage, Interaction, MemInfo, RawMode, RemoteEntry, Reply,
};

/// Seconds between the Unix epoch and the 2000 epoch most ports use.
const EPOCH_2000: i64 = 946_684_800;

/// Open the byte stream for `port`: a serial device, or `tcp:HOST:PORT`.
pub async fn open_transport(port: &str, baud: u32) -> std::io::Result<Box<dyn Transport>> {
    if let Some(addr) = port.strip_prefix("tcp:") {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        return Ok(Box::new(stream));
    }
    let stream = tokio_serial::new(port, baud).open_native_async()?;
    Ok(Box::new(stream))
}

/// A board reached over a raw REPL [`Channel`].
pub struct Device<T> {
    channel: Channel<T>,
    epoch_offset: Option<i64>,
}

impl Device<Box<dyn Transport>> {
    pub async fn connect(port: &str, baud: u32, timeout: Duration) -> Result<Self> {
        tracing::info!(port, baud, "connecting");
        let io = open_transport(port, baud).await?;
        Ok(Self::new(io, timeout))
    }
}

impl<T: Transport> Device<T> {
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            channel: Channel::new(io, timeout),
            epoch_offset: None,
        }
    }

    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    /// Run a filesystem snippet; an `OSError` is attributed to `path`.
    async fn fs_exec(&mut self, code: &str, path: &str) -> Result<String> {
        let reply = self.channel.run(code).await?;
        if reply.failed() {
            return Err(classify(&reply, path));
        }
        Ok(reply.output)
    }

    async fn fs_value(&mut self, code: &str, path: &str) -> Result<Value> {
        let output = self.fs_exec(code, path).await?;
        Ok(crate::codec::decode(output.trim())?)
    }

    async fn epoch_offset(&mut self) -> Result<i64> {
        if let Some(offset) = self.epoch_offset {
            return Ok(offset);
        }
        let year = self
            .eval("__import__('time').gmtime(0)[0]")
            .await?
            .as_int()
            .unwrap_or(2000);
        let offset = if year == 1970 { 0 } else { EPOCH_2000 };
        tracing::debug!(year, "device epoch");
        self.epoch_offset = Some(offset);
        Ok(offset)
    }
}

fn quote(path: &str) -> String {
    encode(&Value::from(path))
}

fn classify(reply: &Reply, path: &str) -> DeviceError {
    let summary = reply.error_summary();
    match summary.strip_prefix("OSError:") {
        Some(detail) => RemoteFsError::new(parse_errno(detail.trim()), path).into(),
        None => DeviceError::Raised(summary),
    }
}

/// Accepts `[Errno 2] ENOENT`, `2` and `ENOENT`.
fn parse_errno(detail: &str) -> FsErrorKind {
    let detail = detail.strip_prefix("[Errno ").unwrap_or(detail);
    let digits: String = detail.chars().take_while(char::is_ascii_digit).collect();
    if let Ok(errno) = digits.parse() {
        return FsErrorKind::from_errno(errno);
    }
    detail
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(FsErrorKind::from_name)
        .unwrap_or(FsErrorKind::Io)
}

fn unexpected(value: &Value) -> DeviceError {
    DeviceError::Unexpected(value.to_string())
}

fn int_fields(value: &Value, count: usize) -> Result<Vec<i64>> {
    let items = value.as_seq().ok_or_else(|| unexpected(value))?;
    if items.len() < count {
        return Err(unexpected(value));
    }
    items[..count]
        .iter()
        .map(|v| v.as_int().ok_or_else(|| unexpected(value)))
        .collect()
}

fn unsigned(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn mode_bits(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

fn base_name(path: &str) -> String {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("/")
        .to_string()
}

#[async_trait]
impl<T: Transport> Evaluator for Device<T> {
    async fn run(&mut self, code: &str) -> Result<Reply> {
        Ok(self.channel.run(code).await?)
    }

    async fn interact(&mut self, line: &str) -> Result<Interaction> {
        Ok(self.channel.interact(line).await?)
    }

    async fn hold(&mut self) -> Result<()> {
        Ok(self.channel.hold().await?)
    }

    async fn release(&mut self) -> Result<()> {
        Ok(self.channel.release().await?)
    }

    async fn interrupt(&mut self) -> Result<()> {
        Ok(self.channel.interrupt().await?)
    }

    async fn soft_reset(&mut self) -> Result<()> {
        Ok(self.channel.soft_reset().await?)
    }

    fn mode(&self) -> RawMode {
        self.channel.mode()
    }
}

const LIST_SNIPPET: &str = "\
import os
def _mpsh_ls(d):
    r = []
    for e in os.ilistdir(d):
        try:
            s = os.stat(d.rstrip('/') + '/' + e[0])
            r.append((e[0], s[0], s[6], s[8]))
        except OSError:
            r.append((e[0], e[1], 0, 0))
    print(repr(r))
";

#[async_trait]
impl<T: Transport> RemoteFs for Device<T> {
    async fn stat(&mut self, path: &str) -> Result<RemoteEntry> {
        let code = format!("import os\nprint(repr(os.stat({})))", quote(path));
        let value = self.fs_value(&code, path).await?;
        let fields = int_fields(&value, 9)?;
        let offset = self.epoch_offset().await?;
        let mode = mode_bits(fields[0]);
        Ok(RemoteEntry {
            name: base_name(path),
            kind: EntryKind::from_mode(mode),
            size: unsigned(fields[6]),
            mode,
            mtime: if fields[8] == 0 { 0 } else { fields[8] + offset },
        })
    }

    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let code = format!("{LIST_SNIPPET}_mpsh_ls({})", quote(path));
        let value = self.fs_value(&code, path).await?;
        let offset = self.epoch_offset().await?;
        let rows = value.as_seq().ok_or_else(|| unexpected(&value))?;
        rows.iter()
            .map(|row| {
                let items = row.as_seq().ok_or_else(|| unexpected(row))?;
                let name = items
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| unexpected(row))?
                    .to_string();
                let rest = items
                    .get(1..4)
                    .ok_or_else(|| unexpected(row))?
                    .iter()
                    .map(|v| v.as_int().ok_or_else(|| unexpected(row)))
                    .collect::<Result<Vec<_>>>()?;
                let mode = mode_bits(rest[0]);
                Ok(RemoteEntry {
                    name,
                    kind: EntryKind::from_mode(mode),
                    size: unsigned(rest[1]),
                    mode,
                    mtime: if rest[2] == 0 { 0 } else { rest[2] + offset },
                })
            })
            .collect()
    }

    async fn mkdir(&mut self, path: &str) -> Result<()> {
        let code = format!("import os\nos.mkdir({})", quote(path));
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn rmdir(&mut self, path: &str) -> Result<()> {
        let code = format!("import os\nos.rmdir({})", quote(path));
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn remove(&mut self, path: &str) -> Result<()> {
        let code = format!("import os\nos.remove({})", quote(path));
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let code = format!("import os\nos.rename({}, {})", quote(from), quote(to));
        self.fs_exec(&code, from).await.map(drop)
    }

    async fn copy_file(&mut self, from: &str, to: &str) -> Result<()> {
        let code = format!(
            "with open({}, 'rb') as _f:\n    with open({}, 'wb') as _g:\n        while True:\n            _d = _f.read(256)\n            if not _d:\n                break\n            _g.write(_d)",
            quote(from),
            quote(to)
        );
        self.fs_exec(&code, from).await.map(drop)
    }

    async fn touch(&mut self, path: &str) -> Result<()> {
        let code = format!("open({}, 'ab').close()", quote(path));
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn read_chunk(&mut self, path: &str, offset: u64, len: usize) -> Result<Bytes> {
        let code = format!(
            "with open({}, 'rb') as _f:\n    _f.seek({offset})\n    print(repr(_f.read({len})))",
            quote(path)
        );
        let value = self.fs_value(&code, path).await?;
        match value {
            Value::Bytes(data) => Ok(Bytes::from(data)),
            other => Err(unexpected(&other)),
        }
    }

    async fn write_chunk(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mode = if offset == 0 { "wb" } else { "ab" };
        let code = format!(
            "with open({}, '{mode}') as _f:\n    _f.write({})",
            quote(path),
            encode(&Value::Bytes(data.to_vec()))
        );
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn chdir(&mut self, path: &str) -> Result<()> {
        let code = format!("import os\nos.chdir({})", quote(path));
        self.fs_exec(&code, path).await.map(drop)
    }

    async fn statvfs(&mut self, path: &str) -> Result<FsUsage> {
        let code = format!("import os\nprint(repr(os.statvfs({})))", quote(path));
        let value = self.fs_value(&code, path).await?;
        let fields = int_fields(&value, 4)?;
        Ok(FsUsage {
            block_size: unsigned(fields[1]),
            total_blocks: unsigned(fields[2]),
            free_blocks: unsigned(fields[3]),
        })
    }

    async fn rtc_now(&mut self) -> Result<NaiveDateTime> {
        let value = self.eval("__import__('time').localtime()").await?;
        let f = int_fields(&value, 6)?;
        let part = |n: i64| u32::try_from(n).unwrap_or(0);
        i32::try_from(f[0])
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, part(f[1]), part(f[2])))
            .and_then(|date| date.and_hms_opt(part(f[3]), part(f[4]), part(f[5])))
            .ok_or_else(|| unexpected(&value))
    }

    async fn rtc_set(&mut self, time: NaiveDateTime) -> Result<()> {
        let code = format!(
            "import machine\nmachine.RTC().datetime(({}, {}, {}, {}, {}, {}, {}, 0))",
            time.year(),
            time.month(),
            time.day(),
            time.weekday().num_days_from_monday(),
            time.hour(),
            time.minute(),
            time.second()
        );
        self.exec(&code).await.map(drop)
    }
}

const INFO_SNIPPET: &str = "\
import os, sys
try:
    import machine, binascii
    _u = binascii.hexlify(machine.unique_id()).decode()
except Exception:
    _u = ''
print(repr(tuple(os.uname()) + (sys.platform, _u)))
";

#[async_trait]
impl<T: Transport> Board for Device<T> {
    async fn info(&mut self) -> Result<DeviceInfo> {
        let output = self.exec(INFO_SNIPPET).await?;
        let value = crate::codec::decode(output.trim())?;
        let items = value.as_seq().ok_or_else(|| unexpected(&value))?;
        let field = |i: usize| {
            items
                .get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(DeviceInfo {
            sysname: field(0),
            nodename: field(1),
            release: field(2),
            version: field(3),
            machine: field(4),
            platform: field(5),
            unique_id: field(6),
        })
    }

    async fn mem_info(&mut self, collect: bool) -> Result<MemInfo> {
        let code = format!(
            "import gc\n_b = gc.mem_free()\n{}print(repr((_b, gc.mem_free(), gc.mem_alloc())))",
            if collect { "gc.collect()\n" } else { "" }
        );
        let output = self.exec(&code).await?;
        let value = crate::codec::decode(output.trim())?;
        let f = int_fields(&value, 3)?;
        Ok(MemInfo {
            free_before: unsigned(f[0]),
            free: unsigned(f[1]),
            alloc: unsigned(f[2]),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::channel::fake::{spawn, Script};

    fn device(replies: &[(String, &str, &str)]) -> Device<tokio::io::DuplexStream> {
        let mut all: HashMap<String, (String, String)> = replies
            .iter()
            .map(|(code, out, err)| (code.clone(), ((*out).to_string(), (*err).to_string())))
            .collect();
        all.insert(
            "print(repr(__import__('time').gmtime(0)[0]))".to_string(),
            ("2000\r\n".to_string(), String::new()),
        );
        let io = spawn(Script {
            replies: all,
            lines: HashMap::new(),
        });
        Device::new(io, Duration::from_secs(2))
    }

    const ENOENT: &str =
        "Traceback (most recent call last):\r\n  File \"<stdin>\", line 2, in <module>\r\nOSError: [Errno 2] ENOENT\r\n";

    #[test]
    fn errno_forms() {
        assert_eq!(parse_errno("[Errno 2] ENOENT"), FsErrorKind::NotFound);
        assert_eq!(parse_errno("39"), FsErrorKind::NotEmpty);
        assert_eq!(parse_errno("ENOTDIR"), FsErrorKind::NotADirectory);
        assert_eq!(parse_errno("weird"), FsErrorKind::Io);
    }

    #[test]
    fn base_names() {
        assert_eq!(base_name("/lib/foo.py"), "foo.py");
        assert_eq!(base_name("/lib/"), "lib");
        assert_eq!(base_name("/"), "/");
    }

    #[tokio::test]
    async fn list_decodes_entries_and_shifts_epoch() {
        let code = format!("{LIST_SNIPPET}_mpsh_ls('/lib')");
        let mut dev = device(&[(
            code,
            "[('a.py', 32768, 120, 10), ('pkg', 16384, 0, 0)]\r\n",
            "",
        )]);

        let entries = dev.list("/lib").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.py");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 120);
        assert_eq!(entries[0].mtime, EPOCH_2000 + 10);
        assert!(entries[1].is_dir());
        assert_eq!(entries[1].mtime, 0);
    }

    #[tokio::test]
    async fn os_error_maps_to_remote_fs_error() {
        let mut dev = device(&[("import os\nos.remove('/nope')".to_string(), "", ENOENT)]);

        let err = dev.remove("/nope").await.unwrap_err();
        match err {
            DeviceError::Fs(e) => {
                assert_eq!(e.kind, FsErrorKind::NotFound);
                assert_eq!(e.path, "/nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_chunk_decodes_bytes() {
        let code = "with open('/main.py', 'rb') as _f:\n    _f.seek(0)\n    print(repr(_f.read(4)))";
        let mut dev = device(&[(code.to_string(), "b'im\\x00t'\r\n", "")]);

        let data = dev.read_chunk("/main.py", 0, 4).await.unwrap();
        assert_eq!(&data[..], b"im\0t");
    }

    #[tokio::test]
    async fn eval_decodes_value() {
        let mut dev = device(&[("print(repr(1+1))".to_string(), "2\r\n", "")]);
        assert_eq!(dev.eval("1+1").await.unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn statvfs_uses_fragment_size() {
        let code = "import os\nprint(repr(os.statvfs('/')))";
        let mut dev = device(&[(
            code.to_string(),
            "(4096, 4096, 512, 100, 100, 0, 0, 0, 0, 255)\r\n",
            "",
        )]);

        let usage = dev.statvfs("/").await.unwrap();
        assert_eq!(usage.total_bytes(), 4096 * 512);
        assert_eq!(usage.free_bytes(), 4096 * 100);
    }
}
