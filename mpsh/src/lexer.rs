//! Line splitting and tokenizing
//!
//! A line is classified by its first character: `!` runs on the host shell,
//! `%` holds magic commands, anything else goes to the board's REPL untouched.
//! Magic lines are split on unquoted, unescaped `;` and every segment keeps
//! its own classification.

use chumsky::prelude::*;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    /// Some part of the word was quoted or escaped, so it is never globbed.
    pub quoted: bool,
}

impl Word {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    /// True for an unquoted word starting with `-`.
    pub fn is_flag_like(&self) -> bool {
        !self.quoted && self.text.len() > 1 && self.text.starts_with('-')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subcommand {
    /// A built-in command (or alias) with its tokenized words.
    Magic(Vec<Word>),
    /// Text for the host shell, passed on verbatim.
    Shell(String),
    /// Raw input for the board's interactive prompt.
    Passthrough(String),
}

/// Split a line typed at the board prompt.
pub fn split_line(raw: &str) -> Result<Vec<Subcommand>, ParseError> {
    split(raw, false)
}

/// Split a line typed in multi-command mode, where `%` is optional.
pub fn split_magic_line(raw: &str) -> Result<Vec<Subcommand>, ParseError> {
    split(raw, true)
}

fn split(raw: &str, magic_default: bool) -> Result<Vec<Subcommand>, ParseError> {
    if let Some(rest) = raw.strip_prefix('!') {
        let rest = rest.trim();
        return Ok(if rest.is_empty() {
            Vec::new()
        } else {
            vec![Subcommand::Shell(rest.to_string())]
        });
    }
    if !magic_default && !raw.starts_with('%') {
        return Ok(if raw.trim().is_empty() {
            Vec::new()
        } else {
            vec![Subcommand::Passthrough(raw.to_string())]
        });
    }

    let mut subcommands = Vec::new();
    for segment in split_segments(raw)? {
        let segment = segment.trim();
        if segment.is_empty() || segment.starts_with('#') {
            continue;
        }
        if let Some(rest) = segment.strip_prefix('%') {
            let words = tokenize(rest)?;
            if !words.is_empty() {
                subcommands.push(Subcommand::Magic(words));
            }
        } else if let Some(rest) = segment.strip_prefix('!') {
            let rest = rest.trim();
            if !rest.is_empty() {
                subcommands.push(Subcommand::Shell(rest.to_string()));
            }
        } else if magic_default {
            subcommands.push(Subcommand::Magic(tokenize(segment)?));
        } else {
            subcommands.push(Subcommand::Passthrough(segment.to_string()));
        }
    }
    Ok(subcommands)
}

/// Cut `line` at every `;` that is neither quoted nor escaped.
fn split_segments(line: &str) -> Result<Vec<&str>, ParseError> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            // Backslash is literal inside single quotes.
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (Some(_), '\\') | (None, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => {
                segments.push(&line[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }
    if let Some(q) = quote {
        return Err(ParseError::UnterminatedQuote(q));
    }
    segments.push(&line[start..]);
    Ok(segments)
}

/// Break one magic subcommand into words.
pub fn tokenize(text: &str) -> Result<Vec<Word>, ParseError> {
    tokenizer().parse(text).map_err(|errs| {
        let msg = errs
            .into_iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ParseError::Syntax(msg)
    })
}

fn tokenizer() -> impl Parser<char, Vec<Word>, Error = Simple<char>> {
    let ws = filter(|c: &char| c.is_whitespace()).repeated();

    // (quoted, text) segments; adjacent segments form one word.
    let sq_seg = just('\'')
        .ignore_then(filter(|c: &char| *c != '\'').repeated())
        .then_ignore(just('\''))
        .collect::<String>()
        .map(|s| (true, s));

    let dq_seg = just('"')
        .ignore_then(
            just('\\')
                .ignore_then(any())
                .map(|c: char| match c {
                    '"' | '\\' => c.to_string(),
                    _ => format!("\\{c}"),
                })
                .or(filter(|c: &char| *c != '"' && *c != '\\').map(|c: char| c.to_string()))
                .repeated(),
        )
        .then_ignore(just('"'))
        .map(|parts: Vec<String>| (true, parts.concat()));

    let escaped = just('\\')
        .ignore_then(any())
        .map(|c: char| (true, c.to_string()));

    let bare = filter(|c: &char| !c.is_whitespace() && !matches!(c, '\'' | '"' | '\\'))
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|s| (false, s));

    let word = choice((bare, sq_seg, dq_seg, escaped))
        .repeated()
        .at_least(1)
        .map(|segments: Vec<(bool, String)>| Word {
            quoted: segments.iter().any(|(quoted, _)| *quoted),
            text: segments.into_iter().map(|(_, s)| s).collect(),
        });

    ws.clone()
        .ignore_then(word.then_ignore(ws).repeated())
        .then_ignore(end())
}

/// Render `word` so that [`tokenize`] reads it back unchanged.
pub fn quote_word(word: &Word) -> String {
    if word.quoted || word.text.is_empty() {
        quote(&word.text)
    } else {
        word.text.clone()
    }
}

/// Single-quote `text`, splicing in escaped quotes where needed.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic(words: &[&str]) -> Subcommand {
        Subcommand::Magic(words.iter().map(|w| Word::new(*w)).collect())
    }

    fn texts(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn test_split_mixed_line() {
        let subs = split_line("%ls /lib; %cd /lib; ls").unwrap();
        assert_eq!(
            subs,
            vec![
                magic(&["ls", "/lib"]),
                magic(&["cd", "/lib"]),
                Subcommand::Passthrough("ls".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_segments_dropped() {
        let subs = split_line("%pwd;; ;%pwd;").unwrap();
        assert_eq!(subs, vec![magic(&["pwd"]), magic(&["pwd"])]);
    }

    #[test]
    fn test_plain_line_not_split() {
        let subs = split_line("x = 1; y = 2").unwrap();
        assert_eq!(subs, vec![Subcommand::Passthrough("x = 1; y = 2".to_string())]);
    }

    #[test]
    fn test_bang_line_is_verbatim() {
        let subs = split_line("!ls -l; date").unwrap();
        assert_eq!(subs, vec![Subcommand::Shell("ls -l; date".to_string())]);
    }

    #[test]
    fn test_bang_segment_inside_magic_line() {
        let subs = split_line("%pwd; !date").unwrap();
        assert_eq!(subs, vec![magic(&["pwd"]), Subcommand::Shell("date".to_string())]);
    }

    #[test]
    fn test_quoted_and_escaped_separator() {
        let subs = split_line(r#"%echo "a;b" 'c;d' e\;f"#).unwrap();
        let Subcommand::Magic(words) = &subs[0] else {
            panic!("expected magic subcommand");
        };
        assert_eq!(subs.len(), 1);
        assert_eq!(texts(words), vec!["echo", "a;b", "c;d", "e;f"]);
        assert!(!words[0].quoted);
        assert!(words[1].quoted && words[2].quoted && words[3].quoted);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            split_line("%echo 'oops; %pwd"),
            Err(ParseError::UnterminatedQuote('\''))
        );
    }

    #[test]
    fn test_multi_mode_defaults_to_magic() {
        let subs = split_magic_line("ls :/lib; %pwd; # note").unwrap();
        assert_eq!(subs, vec![magic(&["ls", ":/lib"]), magic(&["pwd"])]);
    }

    #[test]
    fn test_compound_word() {
        let words = tokenize(r#"connect='exec "net.connect(\"{}\",\"{}\")"'"#).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, r#"connect=exec "net.connect(\"{}\",\"{}\")""#);
    }

    #[test]
    fn test_double_quote_escapes() {
        let words = tokenize(r#""say \"hi\"\n""#).unwrap();
        assert_eq!(words[0].text, r#"say "hi"\n"#);
    }

    #[test]
    fn test_glob_chars_stay_unquoted() {
        let words = tokenize("*.py '*.txt'").unwrap();
        assert!(!words[0].quoted);
        assert!(words[1].quoted);
    }

    #[test]
    fn test_quote_round_trip() {
        for text in ["plain", "two words", "it's", ""] {
            let word = Word::quoted(text);
            let back = tokenize(&quote_word(&word)).unwrap();
            assert_eq!(back, vec![word]);
        }
    }

    #[test]
    fn test_whitespace_only() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
