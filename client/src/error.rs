use std::time::Duration;

use thiserror::Error;

/// Failures of the raw REPL link itself.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device timeout after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("interrupted")]
    Interrupted,
}

impl ChannelError {
    /// Transport loss that ends the session.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    NotFound,
    NotADirectory,
    IsADirectory,
    NotEmpty,
    AlreadyExists,
    PermissionDenied,
    Io,
}

impl FsErrorKind {
    /// Maps a MicroPython `OSError` errno. Ports disagree on a few numbers,
    /// so both the Linux and the newlib values are accepted.
    pub const fn from_errno(errno: i64) -> Self {
        match errno {
            2 => Self::NotFound,
            1 | 13 => Self::PermissionDenied,
            17 => Self::AlreadyExists,
            20 => Self::NotADirectory,
            21 => Self::IsADirectory,
            39 | 66 | 90 => Self::NotEmpty,
            _ => Self::Io,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ENOENT" => Self::NotFound,
            "EPERM" | "EACCES" => Self::PermissionDenied,
            "EEXIST" => Self::AlreadyExists,
            "ENOTDIR" => Self::NotADirectory,
            "EISDIR" => Self::IsADirectory,
            "ENOTEMPTY" => Self::NotEmpty,
            "EIO" => Self::Io,
            _ => return None,
        })
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::NotFound => "No such file or directory",
            Self::NotADirectory => "Not a directory",
            Self::IsADirectory => "Is a directory",
            Self::NotEmpty => "Directory not empty",
            Self::AlreadyExists => "File exists",
            Self::PermissionDenied => "Permission denied",
            Self::Io => "I/O error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {}", kind.describe())]
pub struct RemoteFsError {
    pub kind: FsErrorKind,
    pub path: String,
}

impl RemoteFsError {
    pub fn new(kind: FsErrorKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(FsErrorKind::NotFound, path)
    }
}

/// The evaluator printed something that is not a value literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {raw:?}: {reason}")]
pub struct DecodeError {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Fs(#[from] RemoteFsError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An exception raised on the device, as its last traceback line.
    #[error("{0}")]
    Raised(String),

    #[error("unexpected reply from device: {0}")]
    Unexpected(String),
}

impl DeviceError {
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        Self::Channel(ChannelError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsErrorKind::from_errno(2), FsErrorKind::NotFound);
        assert_eq!(FsErrorKind::from_errno(39), FsErrorKind::NotEmpty);
        assert_eq!(FsErrorKind::from_errno(5), FsErrorKind::Io);
        assert_eq!(FsErrorKind::from_name("EEXIST"), Some(FsErrorKind::AlreadyExists));
        assert_eq!(FsErrorKind::from_name("EWHAT"), None);
    }

    #[test]
    fn remote_fs_error_display() {
        let err = RemoteFsError::not_found("/lib/x.py");
        assert_eq!(err.to_string(), "/lib/x.py: No such file or directory");
    }

    #[test]
    fn fatal_classification() {
        assert!(DeviceError::Channel(ChannelError::Disconnected).is_fatal());
        assert!(!DeviceError::Channel(ChannelError::Timeout(Duration::from_secs(1))).is_fatal());
        assert!(!DeviceError::Raised("ValueError".into()).is_fatal());
    }
}
