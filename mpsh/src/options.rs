//! Typed shell options and their on-disk store.
//!
//! Options are persisted as replayable command lines (`set key=value`,
//! `alias name=template`) so loading them is just running the file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::alias::Aliases;
use crate::colour::AnsiColour;
use crate::error::{ShellError, ShellResult};
use crate::lexer::quote;
use crate::prompt;

pub const DEFAULT_PROMPT: &str = "{bold-cyan}{id} {yellow}{platform} ({free}){bold-blue}{pwd}> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    Prompt,
    PromptColour,
    /// Display name for the connected board.
    Name,
    /// JSON object mapping unique ids to names.
    Names,
    /// JSON object of extra `ls` colours.
    LsColour,
    /// Text shown for prompt placeholders with no value.
    Missing,
}

impl OptionKey {
    pub const ALL: [Self; 6] = [
        Self::Prompt,
        Self::PromptColour,
        Self::Name,
        Self::Names,
        Self::LsColour,
        Self::Missing,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::PromptColour => "promptcolour",
            Self::Name => "name",
            Self::Names => "names",
            Self::LsColour => "lscolour",
            Self::Missing => "missing",
        }
    }
}

impl FromStr for OptionKey {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "prompt" => Self::Prompt,
            "promptcolour" | "promptcolor" => Self::PromptColour,
            "name" => Self::Name,
            "names" => Self::Names,
            "lscolour" | "lscolor" => Self::LsColour,
            "missing" => Self::Missing,
            _ => return Err(ShellError::InvalidOption(format!("unknown key: {s}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub prompt: String,
    pub prompt_colour: String,
    pub names: BTreeMap<String, String>,
    pub ls_colours: BTreeMap<String, String>,
    pub missing: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            prompt_colour: "cyan".to_string(),
            names: BTreeMap::new(),
            ls_colours: BTreeMap::new(),
            missing: String::new(),
        }
    }
}

impl Options {
    /// Apply one `key=value` setting. Nothing changes unless the value is
    /// valid. `unique_id` identifies the board for [`OptionKey::Name`].
    pub fn set(
        &mut self,
        key: OptionKey,
        value: &str,
        unique_id: &str,
        colour: &AnsiColour,
    ) -> ShellResult<()> {
        match key {
            OptionKey::Prompt => {
                prompt::validate(value).map_err(ShellError::InvalidOption)?;
                self.prompt = value.to_string();
            }
            OptionKey::PromptColour => {
                if !colour.is_colour(value) {
                    return Err(ShellError::InvalidOption(format!("invalid colour: {value}")));
                }
                self.prompt_colour = value.to_string();
            }
            OptionKey::Name => {
                if unique_id.is_empty() {
                    return Err(ShellError::InvalidOption(
                        "board has no unique id to name".to_string(),
                    ));
                }
                self.names.insert(unique_id.to_string(), value.to_string());
            }
            OptionKey::Names => {
                let names = parse_json_map(value)?;
                self.names.extend(names);
            }
            OptionKey::LsColour => {
                let specs = parse_json_map(value)?;
                if let Some(bad) = specs.values().find(|v| !colour.is_colour(v)) {
                    return Err(ShellError::InvalidOption(format!("invalid colour: {bad}")));
                }
                self.ls_colours.extend(specs);
            }
            OptionKey::Missing => self.missing = value.to_string(),
        }
        Ok(())
    }

    /// The `set` line that restores `key`.
    pub fn line_for(&self, key: OptionKey) -> Option<String> {
        let value = match key {
            OptionKey::Prompt => self.prompt.clone(),
            OptionKey::PromptColour => self.prompt_colour.clone(),
            OptionKey::Names => serde_json::to_string(&self.names).ok()?,
            OptionKey::LsColour => serde_json::to_string(&self.ls_colours).ok()?,
            OptionKey::Missing => self.missing.clone(),
            // Stored inside `names`.
            OptionKey::Name => return None,
        };
        Some(format!("set {}={}", key.as_str(), quote(&value)))
    }

    /// Every option and alias as replayable command lines.
    pub fn to_lines(&self, aliases: &Aliases) -> Vec<String> {
        let mut lines: Vec<String> = OptionKey::ALL
            .iter()
            .filter_map(|key| self.line_for(*key))
            .collect();
        lines.extend(
            aliases
                .iter()
                .map(|(name, template)| format!("alias {name}={}", quote(template))),
        );
        lines
    }
}

fn parse_json_map(value: &str) -> ShellResult<BTreeMap<String, String>> {
    serde_json::from_str(value).map_err(|e| ShellError::InvalidOption(format!("invalid JSON: {e}")))
}

/// Where options and aliases are kept between sessions.
pub trait OptionStore: Send {
    fn load(&self) -> std::io::Result<Vec<String>>;

    fn save(&mut self, lines: &[String]) -> std::io::Result<()>;
}

const STORE_HEADER: &str = "# Written by mpsh: edits are overwritten on the next set or alias.";

/// Options kept in a text file of command lines.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OptionStore for FileStore {
    fn load(&self) -> std::io::Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn save(&mut self, lines: &[String]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::File::create(&self.path)?;
        writeln!(file, "{STORE_HEADER}")?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

/// Options kept in memory, shared with whoever holds a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(lines)),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl OptionStore for MemoryStore {
    fn load(&self) -> std::io::Result<Vec<String>> {
        Ok(self.lines())
    }

    fn save(&mut self, lines: &[String]) -> std::io::Result<()> {
        if let Ok(mut stored) = self.lines.lock() {
            *stored = lines.to_vec();
        }
        Ok(())
    }
}
