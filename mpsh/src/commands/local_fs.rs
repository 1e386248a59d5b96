use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use mpsh_client::FsErrorKind;

use super::fs::Entry;
use crate::error::{ShellError, ShellResult};

/// Short message for a local I/O error, worded like the board's errors.
pub fn describe_io(err: &std::io::Error) -> String {
    let kind = match err.kind() {
        ErrorKind::NotFound => FsErrorKind::NotFound,
        ErrorKind::PermissionDenied => FsErrorKind::PermissionDenied,
        ErrorKind::AlreadyExists => FsErrorKind::AlreadyExists,
        _ => match err.raw_os_error() {
            Some(20) => FsErrorKind::NotADirectory,
            Some(21) => FsErrorKind::IsADirectory,
            Some(39 | 66) => FsErrorKind::NotEmpty,
            _ => return err.to_string(),
        },
    };
    kind.describe().to_string()
}

fn local_err(path: &Path) -> impl FnOnce(std::io::Error) -> ShellError + '_ {
    move |e| ShellError::local(path, e)
}

pub fn local_stat(path: &Path) -> ShellResult<Entry> {
    let metadata = fs::metadata(path).map_err(local_err(path))?;
    Ok(entry_from(path, &metadata))
}

fn entry_from(path: &Path, metadata: &fs::Metadata) -> Entry {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0);
    let name = path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |n| n.to_string_lossy().into_owned(),
    );
    Entry {
        name,
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        mtime,
    }
}

/// Directory entries in `read_dir` order.
///
/// Symlinks are followed; a dangling one is listed as the link itself. An
/// entry that cannot be read at all is skipped rather than failing the
/// whole listing.
pub fn local_list(path: &Path) -> ShellResult<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(local_err(path))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let child = entry.path();
        match fs::metadata(&child).or_else(|_| entry.metadata()) {
            Ok(metadata) => entries.push(entry_from(&child, &metadata)),
            Err(e) => {
                tracing::warn!(path = %child.display(), error = %e, "skipping unreadable entry");
            }
        }
    }
    Ok(entries)
}

pub fn local_mkdir(path: &Path) -> ShellResult<()> {
    fs::create_dir(path).map_err(local_err(path))
}

pub fn local_rmdir(path: &Path) -> ShellResult<()> {
    fs::remove_dir(path).map_err(local_err(path))
}

pub fn local_remove(path: &Path) -> ShellResult<()> {
    fs::remove_file(path).map_err(local_err(path))
}

pub fn local_rename(from: &Path, to: &Path) -> ShellResult<()> {
    fs::rename(from, to).map_err(local_err(from))
}

pub fn local_copy(from: &Path, to: &Path) -> ShellResult<()> {
    fs::copy(from, to).map(|_| ()).map_err(local_err(from))
}

pub fn local_touch(path: &Path) -> ShellResult<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(local_err(path))
}

pub fn local_read_file(path: &Path) -> ShellResult<Vec<u8>> {
    fs::read(path).map_err(local_err(path))
}

pub fn local_write_file(path: &Path, data: &[u8]) -> ShellResult<()> {
    let mut file = fs::File::create(path).map_err(local_err(path))?;
    file.write_all(data).map_err(local_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ops() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        local_mkdir(&root.join("sub")).unwrap();
        local_write_file(&root.join("b.txt"), b"hello").unwrap();
        local_touch(&root.join("a.txt")).unwrap();

        let mut names: Vec<String> = local_list(root).unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        let entry = local_stat(&root.join("b.txt")).unwrap();
        assert_eq!(entry.size, 5);
        assert!(!entry.is_dir);

        local_copy(&root.join("b.txt"), &root.join("sub/c.txt")).unwrap();
        assert_eq!(local_read_file(&root.join("sub/c.txt")).unwrap(), b"hello");
        local_rename(&root.join("sub/c.txt"), &root.join("d.txt")).unwrap();
        local_remove(&root.join("d.txt")).unwrap();
        local_rmdir(&root.join("sub")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_does_not_break_listing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        local_write_file(&root.join("main.py"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("gone"), root.join("broken")).unwrap();

        let mut names: Vec<String> = local_list(root).unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["broken", "main.py"]);
    }

    #[test]
    fn test_missing_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = local_stat(&missing).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}: No such file or directory", missing.display())
        );
    }
}
