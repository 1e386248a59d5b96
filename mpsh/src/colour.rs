//! ANSI colour names and `ls`-style file colouring.

use std::collections::HashMap;

const BASE: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

/// Fallback when `LS_COLORS` is unset.
const DEFAULT_LS_COLORS: &str = "di=01;34:*.py=01;36";

#[derive(Debug, Clone)]
pub struct AnsiColour {
    enabled: bool,
    names: HashMap<String, String>,
    /// `di` for directories, `.ext` for extensions.
    ls_spec: HashMap<String, String>,
}

impl AnsiColour {
    /// Colour table using `LS_COLORS` from the environment.
    pub fn from_env(enabled: bool) -> Self {
        let spec = std::env::var("LS_COLORS").unwrap_or_default();
        Self::with_ls_colors(&spec, enabled)
    }

    pub fn with_ls_colors(spec: &str, enabled: bool) -> Self {
        let mut names = HashMap::new();
        for (i, name) in BASE.iter().enumerate() {
            names.insert((*name).to_string(), format!("00;3{i}"));
            names.insert(format!("bold-{name}"), format!("01;3{i}"));
        }
        for (name, code) in [
            ("reset", "00"),
            ("normal", "0"),
            ("bold", "1"),
            ("underline", "4"),
            ("reverse", "7"),
        ] {
            names.insert(name.to_string(), code.to_string());
        }
        for i in 0..256 {
            names.insert(format!("ansi{i}"), format!("38;5;{i}"));
        }

        let spec = if spec.trim().is_empty() {
            DEFAULT_LS_COLORS
        } else {
            spec
        };
        let mut ls_spec: HashMap<String, String> = spec
            .split(':')
            .filter_map(|item| item.split_once('='))
            .map(|(k, v)| (k.trim_start_matches('*').to_string(), v.to_string()))
            .collect();
        ls_spec
            .entry(".py".to_string())
            .or_insert_with(|| "01;36".to_string());

        Self {
            enabled,
            names,
            ls_spec,
        }
    }

    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// SGR parameters for a colour name or a raw `01;34` style code.
    pub fn code(&self, spec: &str) -> Option<String> {
        if let Some(code) = self.names.get(spec) {
            return Some(code.clone());
        }
        let raw = !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit() || c == ';');
        raw.then(|| spec.to_string())
    }

    pub fn is_colour(&self, spec: &str) -> bool {
        self.code(spec).is_some()
    }

    /// Escape sequence for `spec`, empty when colour is off or unknown.
    pub fn ansi(&self, spec: &str) -> String {
        match self.code(spec) {
            Some(code) if self.enabled => format!("\x1b[{code}m"),
            _ => String::new(),
        }
    }

    pub fn paint(&self, spec: &str, text: &str) -> String {
        match self.code(spec) {
            Some(code) if self.enabled => format!("\x1b[{code}m{text}\x1b[0m"),
            _ => text.to_string(),
        }
    }

    /// Colour a listing entry the way `ls` does.
    pub fn file_name(&self, name: &str, is_dir: bool) -> String {
        let key = if is_dir {
            Some("di".to_string())
        } else {
            name.rfind('.').map(|i| name[i..].to_string())
        };
        match key.and_then(|k| self.ls_spec.get(&k)) {
            Some(code) => self.paint(code, name),
            None => name.to_string(),
        }
    }

    /// Add `ls` colours from the shell options; keys may be `*.ext`.
    pub fn extend_ls_spec<'a, I>(&mut self, specs: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in specs {
            if let Some(code) = self.code(value) {
                self.ls_spec
                    .insert(key.trim_start_matches('*').to_string(), code);
            }
        }
    }

    /// Every named colour with its escape sequence, for prompt templates.
    pub fn palette(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.names
            .keys()
            .map(move |name| (name.clone(), self.ansi(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_raw_codes() {
        let colour = AnsiColour::with_ls_colors("", true);
        assert_eq!(colour.code("cyan").as_deref(), Some("00;36"));
        assert_eq!(colour.code("bold-blue").as_deref(), Some("01;34"));
        assert_eq!(colour.code("01;32").as_deref(), Some("01;32"));
        assert_eq!(colour.code("ansi200").as_deref(), Some("38;5;200"));
        assert!(!colour.is_colour("chartreuse"));
        assert_eq!(colour.ansi("red"), "\x1b[00;31m");
    }

    #[test]
    fn test_file_colours() {
        let colour = AnsiColour::with_ls_colors("di=01;34:*.txt=00;33", true);
        assert_eq!(colour.file_name("lib", true), "\x1b[01;34mlib\x1b[0m");
        assert_eq!(colour.file_name("a.txt", false), "\x1b[00;33ma.txt\x1b[0m");
        assert_eq!(colour.file_name("main.py", false), "\x1b[01;36mmain.py\x1b[0m");
        assert_eq!(colour.file_name("README", false), "README");
    }

    #[test]
    fn test_disabled_is_plain() {
        let colour = AnsiColour::with_ls_colors("", false);
        assert_eq!(colour.paint("red", "x"), "x");
        assert_eq!(colour.ansi("red"), "");
        assert_eq!(colour.file_name("lib", true), "lib");
    }

    #[test]
    fn test_extend_ls_spec() {
        let mut colour = AnsiColour::with_ls_colors("", true);
        let extra = [("*.mpy".to_string(), "magenta".to_string())];
        colour.extend_ls_spec(extra.iter().map(|(k, v)| (k, v)));
        assert_eq!(colour.file_name("x.mpy", false), "\x1b[00;35mx.mpy\x1b[0m");
    }
}
