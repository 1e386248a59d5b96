use std::borrow::Cow;
use std::sync::{Arc, RwLock};

use mpsh::Shell;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use tokio::sync::Mutex;

pub struct MpshHelper {
    pub shell: Arc<Mutex<Shell>>,
    /// Alias names, refreshed before each prompt.
    pub aliases: Arc<RwLock<Vec<String>>>,
    pub runtime: tokio::runtime::Handle,
}

impl MpshHelper {
    pub fn new(shell: Arc<Mutex<Shell>>, aliases: Arc<RwLock<Vec<String>>>) -> Self {
        Self {
            shell,
            aliases,
            runtime: tokio::runtime::Handle::current(),
        }
    }
}

impl Completer for MpshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];
        let (start, word) = find_word_start(line_to_cursor);
        let before = line_to_cursor[..start].trim_start();

        // `%name` at the start of a subcommand.
        let command_start = before.is_empty() || before.ends_with(';');
        if let Some(prefix) = word.strip_prefix('%').filter(|_| command_start) {
            return Ok((start + 1, self.command_names(prefix)));
        }

        if let Some(open) = word.rfind('{').filter(|&i| !word[i..].contains('}')) {
            let partial = &word[open + 1..];
            return Ok((start + open + 1, placeholder_names(partial)));
        }

        let (dir, partial) = match word.rfind('/') {
            Some(i) => (&word[..=i], &word[i + 1..]),
            None if word.starts_with(':') => (":", &word[1..]),
            None => ("", word),
        };
        let dir_owned = dir.to_string();
        let shell = self.shell.clone();
        let entries = tokio::task::block_in_place(|| {
            self.runtime.block_on(async move {
                let mut shell = shell.lock().await;
                shell.complete_dir(&dir_owned).await
            })
        });

        let mut candidates: Vec<Pair> = entries
            .into_iter()
            .filter(|(name, _)| name.starts_with(partial))
            .map(|(name, is_dir)| {
                let display = if is_dir { format!("{name}/") } else { name };
                Pair {
                    replacement: format!("{dir}{display}"),
                    display,
                }
            })
            .collect();
        candidates.sort_by(|a, b| a.display.cmp(&b.display));
        Ok((start, candidates))
    }
}

impl MpshHelper {
    fn command_names(&self, prefix: &str) -> Vec<Pair> {
        let aliases = self.aliases.read().map(|a| a.clone()).unwrap_or_default();
        let mut names: Vec<String> = mpsh::commands::names()
            .map(str::to_string)
            .chain(aliases)
            .filter(|n| n.starts_with(prefix))
            .collect();
        names.sort();
        names
            .into_iter()
            .map(|n| Pair {
                display: n.clone(),
                replacement: n,
            })
            .collect()
    }
}

const PLACEHOLDERS: &[&str] = &[
    "dev", "device", "free", "free_pc", "id", "lcd", "lcd1", "lcd2", "lcd3", "machine", "name",
    "nodename", "platform", "pwd", "release", "sysname", "unique_id", "version",
];

fn placeholder_names(partial: &str) -> Vec<Pair> {
    PLACEHOLDERS
        .iter()
        .filter(|p| p.starts_with(partial))
        .map(|p| Pair {
            display: (*p).to_string(),
            replacement: format!("{p}}}"),
        })
        .collect()
}

fn find_word_start(line: &str) -> (usize, &str) {
    let mut start = line.len();
    for (i, c) in line.char_indices().rev() {
        if c.is_whitespace() || c == ';' || c == '=' {
            break;
        }
        start = i;
    }
    (start, &line[start..])
}

impl Hinter for MpshHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for MpshHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }
}

impl Validator for MpshHelper {}

impl Helper for MpshHelper {}
