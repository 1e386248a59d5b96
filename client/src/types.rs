use std::fmt;

/// Output of one raw-mode execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub output: String,
    /// Traceback text when the snippet raised; empty otherwise.
    pub error: String,
}

impl Reply {
    pub fn failed(&self) -> bool {
        !self.error.trim().is_empty()
    }

    /// The `Type: message` line that closes a traceback.
    pub fn error_summary(&self) -> String {
        self.error
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// What the device printed in response to one line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub output: String,
    /// `>>> ` or `... ` depending on whether the device expects more input.
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMode {
    Interactive,
    RawEval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

pub const S_IFDIR: u32 = 0x4000;
pub const S_IFREG: u32 = 0x8000;

impl EntryKind {
    pub const fn from_mode(mode: u32) -> Self {
        if mode & 0xf000 == S_IFDIR {
            Self::Directory
        } else {
            Self::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    /// Unix seconds; zero when the filesystem does not keep times.
    pub mtime: i64,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
}

impl FsUsage {
    pub const fn total_bytes(&self) -> u64 {
        self.block_size * self.total_blocks
    }

    pub const fn free_bytes(&self) -> u64 {
        self.block_size * self.free_blocks
    }

    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes().saturating_sub(self.free_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    /// Free heap before an optional collection.
    pub free_before: u64,
    pub free: u64,
    pub alloc: u64,
}

impl MemInfo {
    pub const fn total(&self) -> u64 {
        self.free + self.alloc
    }
}

/// Identification fields reported by the running firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub platform: String,
    /// Hex encoded `machine.unique_id()`, empty when the port has none.
    pub unique_id: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.sysname, self.nodename, self.release, self.version, self.machine
        )
    }
}
