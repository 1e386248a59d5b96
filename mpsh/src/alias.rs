//! Alias table and template expansion
//!
//! A template is plain command text. `{}` takes the next unused argument,
//! `{N}` the Nth (1-based), and `{{`/`}}` are literal braces. Arguments no
//! placeholder consumed are appended. Expansion runs once, so an alias whose
//! template names another alias does not expand it again.

use std::collections::BTreeMap;

use crate::commands;
use crate::error::AliasError;
use crate::lexer::{quote_word, Word};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aliases {
    map: BTreeMap<String, String>,
}

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `name=template`.
    pub fn parse_definition(def: &str) -> Result<(String, String), AliasError> {
        let (name, template) = def
            .split_once('=')
            .ok_or_else(|| AliasError::InvalidDefinition(def.to_string()))?;
        let name = name.trim();
        if name.is_empty() || template.trim().is_empty() {
            return Err(AliasError::InvalidDefinition(def.to_string()));
        }
        Ok((name.to_string(), template.to_string()))
    }

    pub fn define(&mut self, name: &str, template: &str) -> Result<(), AliasError> {
        if name.chars().any(|c| c.is_whitespace() || matches!(c, '%' | '!' | ';' | '='))
            || name.starts_with('-')
        {
            return Err(AliasError::InvalidDefinition(name.to_string()));
        }
        if commands::is_builtin(name) {
            return Err(AliasError::Reserved(name.to_string()));
        }
        self.map.insert(name.to_string(), template.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), AliasError> {
        self.map
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AliasError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Substitute `args` into the template of alias `name`.
///
/// Returns command text to be tokenized again. Placeholder values are inserted
/// as typed; appended arguments are re-quoted so they tokenize to the same
/// words.
pub fn expand(name: &str, template: &str, args: &[Word]) -> Result<String, AliasError> {
    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.len()];
    let mut next = 0usize;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut spec = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == '}' {
                        closed = true;
                        break;
                    }
                    spec.push(d);
                }
                if !closed || !spec.chars().all(|d| d.is_ascii_digit()) {
                    // Not a placeholder, e.g. a dict literal in exec code.
                    out.push('{');
                    out.push_str(&spec);
                    if closed {
                        out.push('}');
                    }
                    continue;
                }
                let index = if spec.is_empty() {
                    while next < used.len() && used[next] {
                        next += 1;
                    }
                    next += 1;
                    next - 1
                } else {
                    spec.parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .unwrap_or(usize::MAX)
                };
                let arg = args
                    .get(index)
                    .ok_or_else(|| AliasError::UndefinedPositionalArg {
                        name: name.to_string(),
                        index: index.saturating_add(1),
                    })?;
                used[index] = true;
                out.push_str(&arg.text);
            }
            _ => out.push(c),
        }
    }

    for (arg, used) in args.iter().zip(&used) {
        if !used {
            out.push(' ');
            out.push_str(&quote_word(arg));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn words(args: &[&str]) -> Vec<Word> {
        args.iter().map(|a| Word::new(*a)).collect()
    }

    #[test]
    fn test_trailing_args_appended() {
        let out = expand("ll", "ls -l", &words(&["/lib"])).unwrap();
        assert_eq!(out, "ls -l /lib");
    }

    #[test]
    fn test_positional_placeholders() {
        let template = r#"exec "net.connect(\"{}\",\"{}\")""#;
        let out = expand("connect", template, &words(&["ssid", "pw"])).unwrap();
        assert_eq!(out, r#"exec "net.connect(\"ssid\",\"pw\")""#);
        let tokens = tokenize(&out).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, r#"net.connect("ssid","pw")"#);
    }

    #[test]
    fn test_numbered_and_sequential_mix() {
        let out = expand("sw", "cp {2} {}", &words(&["a", "b", "c"])).unwrap();
        assert_eq!(out, "cp b a c");
    }

    #[test]
    fn test_undefined_positional() {
        let err = expand("x", "cat {3}", &words(&["a"])).unwrap_err();
        assert_eq!(
            err,
            AliasError::UndefinedPositionalArg {
                name: "x".to_string(),
                index: 3
            }
        );
    }

    #[test]
    fn test_literal_braces() {
        let out = expand("d", "exec \"d = {{}}\"; {'a': 1}", &[]).unwrap();
        assert_eq!(out, "exec \"d = {}\"; {'a': 1}");
    }

    #[test]
    fn test_quoted_trailing_arg_keeps_quoting() {
        let out = expand("e", "echo", &[Word::quoted("two words")]).unwrap();
        assert_eq!(out, "echo 'two words'");
    }

    #[test]
    fn test_define_rejects_builtin() {
        let mut aliases = Aliases::new();
        assert_eq!(
            aliases.define("ls", "ls -l"),
            Err(AliasError::Reserved("ls".to_string()))
        );
        aliases.define("ll", "ls -l").unwrap();
        assert_eq!(aliases.get("ll"), Some("ls -l"));
        aliases.remove("ll").unwrap();
        assert!(aliases.remove("ll").is_err());
    }

    #[test]
    fn test_parse_definition() {
        let (name, template) = Aliases::parse_definition("lr=ls -lR").unwrap();
        assert_eq!((name.as_str(), template.as_str()), ("lr", "ls -lR"));
        assert!(Aliases::parse_definition("novalue=").is_err());
        assert!(Aliases::parse_definition("plain").is_err());
    }
}
