//! Path references and resolution
//!
//! A leading `:` marks a board path; anything else is local. Relative paths
//! are joined with the cwd of their own side and `.`/`..` are folded
//! lexically. Nothing here touches either filesystem.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Marks a token as a board path.
pub const REMOTE_MARK: char = ':';

/// Board path under which a mounted local folder appears.
pub const MOUNT_POINT: &str = "/remote";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Local,
    Remote,
}

impl Domain {
    pub const fn other(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathRef {
    Local(PathBuf),
    Remote(String),
}

impl PathRef {
    pub const fn domain(&self) -> Domain {
        match self {
            Self::Local(_) => Domain::Local,
            Self::Remote(_) => Domain::Remote,
        }
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Local(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(p) => p
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }

    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        match self {
            Self::Local(p) => Self::Local(p.join(name)),
            Self::Remote(p) => Self::Remote(join_remote(p, name)),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Local(p) => p.parent().map(|p| Self::Local(p.to_path_buf())),
            Self::Remote(p) if p == "/" => None,
            Self::Remote(p) => Some(Self::Remote(normalize_remote(&format!("{p}/..")))),
        }
    }

    /// True when `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Local(a), Self::Local(b)) => a.starts_with(b),
            (Self::Remote(a), Self::Remote(b)) => {
                a == b || b == "/" || a.starts_with(&format!("{b}/"))
            }
            _ => false,
        }
    }
}

impl fmt::Display for PathRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(p) => write!(f, "{}", p.display()),
            Self::Remote(p) => write!(f, "{REMOTE_MARK}{p}"),
        }
    }
}

pub fn is_marked(token: &str) -> bool {
    token.starts_with(REMOTE_MARK)
}

pub fn strip_mark(token: &str) -> &str {
    token.strip_prefix(REMOTE_MARK).unwrap_or(token)
}

/// Fold `.`, `..` and repeated slashes of an absolute board path.
pub fn normalize_remote(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

pub fn join_remote(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        normalize_remote(rel)
    } else {
        normalize_remote(&format!("{base}/{rel}"))
    }
}

pub fn normalize_local(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            _ => out.push(component),
        }
    }
    out
}

/// Resolves tokens against a pair of working directories.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    remote_cwd: &'a str,
    local_cwd: &'a Path,
    mounted: Option<&'a Path>,
}

impl<'a> Resolver<'a> {
    pub const fn new(remote_cwd: &'a str, local_cwd: &'a Path, mounted: Option<&'a Path>) -> Self {
        Self {
            remote_cwd,
            local_cwd,
            mounted,
        }
    }

    /// The marker alone decides the side.
    pub fn resolve(&self, token: &str) -> PathRef {
        if is_marked(token) {
            self.resolve_remote(strip_mark(token))
        } else {
            self.resolve_local(token)
        }
    }

    /// Resolve `token` on a fixed side, ignoring any marker.
    pub fn resolve_in(&self, domain: Domain, token: &str) -> PathRef {
        let text = strip_mark(token);
        match domain {
            Domain::Local => self.resolve_local(text),
            Domain::Remote => self.resolve_remote(text),
        }
    }

    pub fn resolve_local(&self, text: &str) -> PathRef {
        let path = if text.is_empty() {
            self.local_cwd.to_path_buf()
        } else {
            self.local_cwd.join(text)
        };
        PathRef::Local(normalize_local(&path))
    }

    /// Board paths under the mount point land in the mounted local folder.
    pub fn resolve_remote(&self, text: &str) -> PathRef {
        let path = join_remote(self.remote_cwd, text);
        if let Some(source) = self.mounted {
            if let Some(rest) = mount_relative(&path) {
                return PathRef::Local(normalize_local(&source.join(rest)));
            }
        }
        PathRef::Remote(path)
    }
}

/// The part of `path` below the mount point, if it is there at all.
fn mount_relative(path: &str) -> Option<&str> {
    if path == MOUNT_POINT {
        return Some("");
    }
    path.strip_prefix(MOUNT_POINT)?.strip_prefix('/')
}
