//! Shell-style pattern matching on single path components.

pub fn contains_glob_chars(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '*' | '?' | '['))
}

/// Split a token into its directory part and its last component.
///
/// The directory part keeps its trailing slash so that `/x` splits into
/// `("/", "x")` and a bare name splits into `("", name)`.
pub fn split_last(token: &str) -> (&str, &str) {
    match token.rfind('/') {
        Some(i) => (&token[..=i], &token[i + 1..]),
        None => ("", token),
    }
}

/// Names matching `pattern`, in the order given.
///
/// A leading `.` in a name must be matched by a literal `.` in the pattern.
pub fn filter_names<'a, I>(pattern: &str, names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let hidden_ok = pattern.starts_with('.');
    names
        .into_iter()
        .filter(|name| hidden_ok || !name.starts_with('.'))
        .filter(|name| matches(pattern, name))
        .map(str::to_string)
        .collect()
}

/// Match `name` against `*`, `?` and `[...]` (with `!`/`^` negation and
/// ranges). Case-sensitive.
pub fn matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    // Pattern index just past the last `*` and the name index it resumes at.
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if pattern.get(p) == Some(&'*') {
            p += 1;
            star = Some((p, n));
        } else if let Some(next) = match_one(&pattern, p, name[n]) {
            p = next;
            n += 1;
        } else if let Some((star_p, star_n)) = star {
            // Let the last `*` swallow one more character and retry.
            p = star_p;
            n = star_n + 1;
            star = Some((star_p, n));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// If the pattern element at `p` matches `c`, the index after it.
fn match_one(pattern: &[char], p: usize, c: char) -> Option<usize> {
    match *pattern.get(p)? {
        '*' => None,
        '?' => Some(p + 1),
        '[' => match parse_class(&pattern[p + 1..]) {
            Some((class, after)) => class.contains(c).then(|| pattern.len() - after.len()),
            // An unclosed bracket is matched literally.
            None => (c == '[').then_some(p + 1),
        },
        literal => (literal == c).then_some(p + 1),
    }
}

struct CharClass {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharClass {
    fn contains(&self, c: char) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != self.negated
    }
}

/// Parse a class body (after `[`), returning it and the pattern after `]`.
fn parse_class(pattern: &[char]) -> Option<(CharClass, &[char])> {
    let mut i = 0;
    let negated = matches!(pattern.first(), Some('!' | '^'));
    if negated {
        i += 1;
    }
    let mut ranges = Vec::new();
    let start = i;
    while i < pattern.len() {
        let c = pattern[i];
        // `]` first in the class is a literal.
        if c == ']' && i > start {
            return Some((CharClass { negated, ranges }, &pattern[i + 1..]));
        }
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            ranges.push((c, pattern[i + 2]));
            i += 3;
        } else {
            ranges.push((c, c));
            i += 1;
        }
    }
    None
}
