//! Prompt templates
//!
//! Templates use `{name}` placeholders. Unknown names render as the
//! configured sentinel and `{{`/`}}` are literal braces.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Expand `template` against `params`.
pub fn render(template: &str, params: &BTreeMap<String, String>, missing: &str) -> String {
    let mut out = String::with_capacity(template.len());
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
                let mut name = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == '}' {
                        closed = true;
                        break;
                    }
                    name.push(d);
                }
                if closed {
                    out.push_str(params.get(&name).map_or(missing, String::as_str));
                } else {
                    out.push('{');
                    out.push_str(&name);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Check that every `{` in `template` is closed.
pub fn validate(template: &str) -> Result<(), String> {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '{' => {
                if !chars.by_ref().any(|d| d == '}') {
                    return Err(format!("unclosed placeholder in prompt: {template}"));
                }
            }
            '}' => return Err(format!("single '}}' in prompt: {template}")),
            _ => {}
        }
    }
    Ok(())
}

/// Placeholder names a template refers to.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rest = &rest[start + 1..];
        if let Some(stripped) = rest.strip_prefix('{') {
            rest = stripped;
            continue;
        }
        match rest.find('}') {
            Some(end) => {
                names.push(rest[..end].to_string());
                rest = &rest[end + 1..];
            }
            None => break,
        }
    }
    names
}

fn tty_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^/dev/tty(.).*(.)$").ok())
        .as_ref()
}

fn com_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^com([0-9]+)$").ok())
        .as_ref()
}

/// Short form of a port name: `/dev/ttyUSB1` is `u1`, `COM2` is `c2`.
pub fn short_device_name(port: &str) -> String {
    let lower = port.to_lowercase();
    if let Some(caps) = com_pattern().and_then(|re| re.captures(&lower)) {
        return format!("c{}", &caps[1]);
    }
    match tty_pattern().and_then(|re| re.captures(&lower)) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => lower,
    }
}

/// Last `n` components of a local path, joined with `/`.
pub fn path_tail(path: &str, n: usize) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    parts[parts.len().saturating_sub(n)..].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        [("pwd", "/lib"), ("name", "node01")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render() {
        assert_eq!(render("{name}:{pwd}> ", &params(), ""), "node01:/lib> ");
        assert_eq!(render("{nope}|{{x}}", &params(), "?"), "?|{x}");
        assert_eq!(render("{open", &params(), ""), "{open");
    }

    #[test]
    fn test_validate() {
        assert!(validate("{a}{{b}}").is_ok());
        assert!(validate("{a").is_err());
        assert!(validate("a}").is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("{a} {{b}} {c}"), vec!["a", "c"]);
    }

    #[test]
    fn test_short_device_name() {
        assert_eq!(short_device_name("/dev/ttyUSB1"), "u1");
        assert_eq!(short_device_name("/dev/ttyACM0"), "a0");
        assert_eq!(short_device_name("COM2"), "c2");
        assert_eq!(short_device_name("tcp:host:23"), "tcp:host:23");
    }

    #[test]
    fn test_path_tail() {
        assert_eq!(path_tail("/home/me/src/proj", 2), "src/proj");
        assert_eq!(path_tail("/home", 3), "home");
    }
}
