//! Filesystem operations on either side of the link.
//!
//! Handlers work with [`PathRef`]s and never care which side a path is on;
//! every method here dispatches to the board or to `std::fs`.

use mpsh_client::{RemoteEntry, RemoteFs};

use super::local_fs::{
    local_copy, local_list, local_mkdir, local_read_file, local_remove, local_rename,
    local_rmdir, local_stat, local_touch, local_write_file,
};
use crate::error::{ResolveError, ShellError, ShellResult};
use crate::glob::{contains_glob_chars, filter_names, split_last};
use crate::lexer::Word;
use crate::path::{is_marked, strip_mark, Domain, PathRef, REMOTE_MARK};
use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// Unix seconds, zero when unknown.
    pub mtime: i64,
}

impl From<RemoteEntry> for Entry {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            is_dir: entry.is_dir(),
            name: entry.name,
            size: entry.size,
            mtime: entry.mtime,
        }
    }
}

impl Shell {
    pub(crate) async fn stat_path(&mut self, path: &PathRef) -> ShellResult<Entry> {
        match path {
            PathRef::Local(p) => local_stat(p),
            PathRef::Remote(p) => Ok(self.board.stat(p).await?.into()),
        }
    }

    /// Whether `path` exists and is a directory. Missing paths are `false`.
    pub(crate) async fn is_dir(&mut self, path: &PathRef) -> ShellResult<bool> {
        match self.stat_path(path).await {
            Ok(entry) => Ok(entry.is_dir),
            Err(e) if e.ends_line() => Err(e),
            Err(_) => Ok(false),
        }
    }

    pub(crate) async fn exists(&mut self, path: &PathRef) -> ShellResult<bool> {
        match self.stat_path(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.ends_line() => Err(e),
            Err(_) => Ok(false),
        }
    }

    pub(crate) async fn list_path(&mut self, path: &PathRef) -> ShellResult<Vec<Entry>> {
        match path {
            PathRef::Local(p) => local_list(p),
            PathRef::Remote(p) => Ok(self
                .board
                .list(p)
                .await?
                .into_iter()
                .map(Entry::from)
                .collect()),
        }
    }

    pub(crate) async fn mkdir_path(&mut self, path: &PathRef) -> ShellResult<()> {
        match path {
            PathRef::Local(p) => local_mkdir(p),
            PathRef::Remote(p) => Ok(self.board.mkdir(p).await?),
        }
    }

    pub(crate) async fn rmdir_path(&mut self, path: &PathRef) -> ShellResult<()> {
        match path {
            PathRef::Local(p) => local_rmdir(p),
            PathRef::Remote(p) => Ok(self.board.rmdir(p).await?),
        }
    }

    pub(crate) async fn remove_path(&mut self, path: &PathRef) -> ShellResult<()> {
        match path {
            PathRef::Local(p) => local_remove(p),
            PathRef::Remote(p) => Ok(self.board.remove(p).await?),
        }
    }

    pub(crate) async fn rename_path(&mut self, from: &PathRef, to: &PathRef) -> ShellResult<()> {
        match (from, to) {
            (PathRef::Local(a), PathRef::Local(b)) => local_rename(a, b),
            (PathRef::Remote(a), PathRef::Remote(b)) => Ok(self.board.rename(a, b).await?),
            _ => Err(ShellError::DomainMismatch(format!("{from} -> {to}"))),
        }
    }

    pub(crate) async fn touch_path(&mut self, path: &PathRef) -> ShellResult<()> {
        match path {
            PathRef::Local(p) => local_touch(p),
            PathRef::Remote(p) => Ok(self.board.touch(p).await?),
        }
    }

    /// Whole file contents; board files are read one chunk at a time.
    pub(crate) async fn read_file(&mut self, path: &PathRef) -> ShellResult<Vec<u8>> {
        match path {
            PathRef::Local(p) => local_read_file(p),
            PathRef::Remote(p) => {
                let mut data = Vec::new();
                loop {
                    let offset = data.len() as u64;
                    let chunk = self.board.read_chunk(p, offset, self.chunk_size).await?;
                    data.extend_from_slice(&chunk);
                    if chunk.len() < self.chunk_size {
                        break;
                    }
                }
                Ok(data)
            }
        }
    }

    pub(crate) async fn write_file(&mut self, path: &PathRef, data: &[u8]) -> ShellResult<()> {
        match path {
            PathRef::Local(p) => local_write_file(p, data),
            PathRef::Remote(p) => {
                if data.is_empty() {
                    return Ok(self.board.write_chunk(p, 0, &[]).await?);
                }
                let mut offset = 0u64;
                for chunk in data.chunks(self.chunk_size) {
                    self.board.write_chunk(p, offset, chunk).await?;
                    offset += chunk.len() as u64;
                }
                Ok(())
            }
        }
    }

    /// Copy one regular file within one side.
    pub(crate) async fn copy_file_path(&mut self, from: &PathRef, to: &PathRef) -> ShellResult<()> {
        match (from, to) {
            (PathRef::Remote(a), PathRef::Remote(b)) => Ok(self.board.copy_file(a, b).await?),
            (PathRef::Local(a), PathRef::Local(b)) => local_copy(a, b),
            _ => Err(ShellError::DomainMismatch(format!("{from} -> {to}"))),
        }
    }

    /// Copy one regular file from one side of the link to the other.
    pub(crate) async fn transfer_file(&mut self, from: &PathRef, to: &PathRef) -> ShellResult<()> {
        if from.domain() == to.domain() {
            return self.copy_file_path(from, to).await;
        }
        let data = self.read_file(from).await?;
        self.write_file(to, &data).await
    }

    /// Resolve one operand, expanding a glob in its last component.
    ///
    /// `domain` forces the side; otherwise the marker decides. Quoted words
    /// are never expanded.
    pub(crate) async fn expand_word(
        &mut self,
        word: &Word,
        domain: Option<Domain>,
    ) -> ShellResult<Vec<PathRef>> {
        let text = word.text.as_str();
        let resolve = |shell: &Self, token: &str| {
            let resolver = shell.session.resolver();
            match domain {
                Some(d) => resolver.resolve_in(d, token),
                None => resolver.resolve(token),
            }
        };

        let marked = is_marked(text);
        let body = strip_mark(text);
        if word.quoted || !contains_glob_chars(body) {
            return Ok(vec![resolve(&*self, text)]);
        }

        let (dir, pattern) = split_last(body);
        let dir_token = if marked {
            format!("{REMOTE_MARK}{dir}")
        } else {
            dir.to_string()
        };
        let dir_ref = resolve(&*self, &dir_token);
        let entries = match self.list_path(&dir_ref).await {
            Ok(entries) => entries,
            Err(e) if e.ends_line() => return Err(e),
            Err(_) => return Err(ResolveError::NoMatch(text.to_string()).into()),
        };
        let names = filter_names(pattern, entries.iter().map(|e| e.name.as_str()));
        if names.is_empty() {
            return Err(ResolveError::NoMatch(text.to_string()).into());
        }
        Ok(names.iter().map(|name| dir_ref.join(name)).collect())
    }
}
