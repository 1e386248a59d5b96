//! Value codec
//!
//! Converts between host values and the literal syntax the MicroPython
//! evaluator reads and prints. `encode` renders a value as source text that
//! can be spliced into a snippet; `decode` parses what `repr()` printed back.

use std::fmt;

use chumsky::prelude::*;

use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion ordered; keys are arbitrary literals.
    Dict(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn as_seq(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_seq(self) -> Option<Vec<Self>> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Multi-line rendering for containers that do not fit on one line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }

    fn write_pretty(&self, out: &mut String, indent: usize) {
        const WIDTH: usize = 80;
        let flat = encode(self);
        if flat.len() + indent <= WIDTH {
            out.push_str(&flat);
            return;
        }
        let pad = " ".repeat(indent + 4);
        let (open, close, items): (&str, &str, Vec<(Option<&Self>, &Self)>) = match self {
            Self::List(v) => ("[", "]", v.iter().map(|x| (None, x)).collect()),
            Self::Tuple(v) => ("(", ")", v.iter().map(|x| (None, x)).collect()),
            Self::Dict(v) => ("{", "}", v.iter().map(|(k, x)| (Some(k), x)).collect()),
            _ => {
                out.push_str(&flat);
                return;
            }
        };
        out.push_str(open);
        out.push('\n');
        for (key, item) in items {
            out.push_str(&pad);
            if let Some(key) = key {
                out.push_str(&encode(key));
                out.push_str(": ");
            }
            item.write_pretty(out, indent + 4);
            out.push_str(",\n");
        }
        out.push_str(&" ".repeat(indent));
        out.push_str(close);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Render `value` as a literal the evaluator can parse.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut String) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => encode_float(*f, out),
        Value::Str(s) => encode_str(s, out),
        Value::Bytes(b) => encode_bytes(b, out),
        Value::List(items) => {
            out.push('[');
            encode_items(items, out);
            out.push(']');
        }
        Value::Tuple(items) => {
            out.push('(');
            encode_items(items, out);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Dict(pairs) => {
            out.push('{');
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode_into(k, out);
                out.push_str(": ");
                encode_into(v, out);
            }
            out.push('}');
        }
    }
}

fn encode_items(items: &[Value], out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        encode_into(item, out);
    }
}

fn encode_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("float('nan')");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "float('inf')" } else { "-float('inf')" });
    } else {
        // Debug keeps a fractional part or exponent, so the literal stays a float.
        out.push_str(&format!("{f:?}"));
    }
}

fn encode_str(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn encode_bytes(bytes: &[u8], out: &mut String) {
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
}

/// Parse a printed literal. Surrounding whitespace is ignored.
pub fn decode(raw: &str) -> Result<Value, DecodeError> {
    parser().parse(raw).map_err(|errors| DecodeError {
        raw: raw.to_string(),
        reason: errors
            .first()
            .map_or_else(|| "invalid literal".to_string(), ToString::to_string),
    })
}

fn hex_escape(len: usize) -> impl Parser<char, char, Error = Simple<char>> + Clone {
    filter(|c: &char| c.is_ascii_hexdigit())
        .repeated()
        .exactly(len)
        .collect::<String>()
        .try_map(|digits, span| {
            u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Simple::custom(span, format!("invalid escape \\x{digits}")))
        })
}

fn quoted() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('\''),
        just('"'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('0').to('\0'),
        just('a').to('\x07'),
        just('b').to('\x08'),
        just('f').to('\x0c'),
        just('v').to('\x0b'),
        just('x').ignore_then(hex_escape(2)),
        just('u').ignore_then(hex_escape(4)),
        just('U').ignore_then(hex_escape(8)),
    )));

    let single = escape
        .clone()
        .or(filter(|c: &char| *c != '\\' && *c != '\''))
        .repeated()
        .delimited_by(just('\''), just('\''));
    let double = escape
        .or(filter(|c: &char| *c != '\\' && *c != '"'))
        .repeated()
        .delimited_by(just('"'), just('"'));

    single.or(double).collect::<String>()
}

fn bytes_literal() -> impl Parser<char, Vec<u8>, Error = Simple<char>> + Clone {
    just('b').ignore_then(quoted()).try_map(|s, span| {
        s.chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| Simple::custom(span, "non-byte character in bytes literal"))
    })
}

fn number() -> impl Parser<char, Value, Error = Simple<char>> + Clone {
    let digits = filter(|c: &char| c.is_ascii_digit()).repeated().at_least(1);
    let frac = just('.').chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()).repeated());
    let exp = one_of("eE")
        .chain::<char, _, _>(one_of("+-").or_not())
        .chain::<char, _, _>(digits.clone());

    let word = text::keyword("inf")
        .to(f64::INFINITY)
        .or(text::keyword("nan").to(f64::NAN));
    let call = just("float(")
        .ignore_then(
            word.clone()
                .delimited_by(just('\''), just('\''))
                .or(word.clone().delimited_by(just('"'), just('"'))),
        )
        .then_ignore(just(')'));
    let special = just('-')
        .or_not()
        .then(call.or(word))
        .map(|(neg, f)| Value::Float(if neg.is_some() { -f } else { f }));

    let numeric = just('-')
        .or_not()
        .chain::<char, _, _>(digits)
        .chain::<char, _, _>(frac.or_not())
        .chain::<char, _, _>(exp.or_not())
        .collect::<String>()
        .try_map(|s, span| {
            let parsed = if s.contains(['.', 'e', 'E']) {
                s.parse::<f64>().ok().map(Value::Float)
            } else {
                s.parse::<i64>().ok().map(Value::Int)
            };
            parsed.ok_or_else(|| Simple::custom(span, format!("invalid number {s}")))
        });

    special.or(numeric)
}

fn parser() -> impl Parser<char, Value, Error = Simple<char>> {
    let value = recursive(|value| {
        let items = value
            .clone()
            .padded()
            .separated_by(just(','))
            .allow_trailing();

        let list = items
            .clone()
            .delimited_by(just('['), just(']').padded())
            .map(Value::List);

        let tuple = items
            .clone()
            .delimited_by(just('('), just(')').padded())
            .map(Value::Tuple);

        let pair = value
            .clone()
            .padded()
            .then_ignore(just(':'))
            .then(value.padded());
        let dict = pair
            .separated_by(just(','))
            .allow_trailing()
            .delimited_by(just('{'), just('}').padded())
            .map(Value::Dict);

        let bytearray = just("bytearray(")
            .ignore_then(bytes_literal())
            .then_ignore(just(')'));

        choice((
            text::keyword("None").to(Value::None),
            text::keyword("True").to(Value::Bool(true)),
            text::keyword("False").to(Value::Bool(false)),
            bytearray.map(Value::Bytes),
            bytes_literal().map(Value::Bytes),
            quoted().map(Value::Str),
            number(),
            list,
            tuple,
            dict,
        ))
        .boxed()
    });

    value.padded().then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value) {
        let text = encode(value);
        assert_eq!(&decode(&text).unwrap(), value, "literal: {text}");
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(&Value::None);
        round_trip(&Value::Bool(true));
        round_trip(&Value::Int(-42));
        round_trip(&Value::Float(1.5));
        round_trip(&Value::Float(1e20));
        round_trip(&Value::Float(f64::NEG_INFINITY));
        round_trip(&Value::Str("it's a \"test\"\n\ttab\\".into()));
        round_trip(&Value::Bytes(vec![0, b'a', b'\'', 0xff, b'\n']));
    }

    #[test]
    fn nested_containers_round_trip() {
        let value = Value::Dict(vec![
            (Value::from("names"), Value::List(vec![Value::from("a"), Value::from("b")])),
            (Value::Int(1), Value::Tuple(vec![Value::Float(0.25)])),
            (Value::from("empty"), Value::Tuple(vec![])),
        ]);
        round_trip(&value);
    }

    #[test]
    fn decodes_evaluator_output() {
        assert_eq!(
            decode("(16384, 4096, 4096, 3998, 3998, 0, 0, 0, 0, 255)\r\n").unwrap(),
            Value::Tuple(vec![
                Value::Int(16384),
                Value::Int(4096),
                Value::Int(4096),
                Value::Int(3998),
                Value::Int(3998),
                Value::Int(0),
                Value::Int(0),
                Value::Int(0),
                Value::Int(0),
                Value::Int(255),
            ])
        );
        assert_eq!(decode("\"don't\"").unwrap(), Value::from("don't"));
        assert_eq!(decode("bytearray(b'\\x01')").unwrap(), Value::Bytes(vec![1]));
        assert_eq!(decode("[1, 2,]").unwrap(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(decode("{}").unwrap(), Value::Dict(vec![]));
        assert_eq!(decode("[ ]").unwrap(), Value::List(vec![]));
        assert_eq!(decode("1e-05").unwrap(), Value::Float(1e-5));
    }

    #[test]
    fn nan_decodes_as_float() {
        assert!(matches!(decode("nan").unwrap(), Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn decode_error_keeps_raw_text() {
        let err = decode("<function f at 0x3ffe1230>").unwrap_err();
        assert_eq!(err.raw, "<function f at 0x3ffe1230>");
        assert!(decode("[1, 2").is_err());
    }

    #[test]
    fn single_element_tuple_has_trailing_comma() {
        assert_eq!(encode(&Value::Tuple(vec![Value::Int(1)])), "(1,)");
    }

    #[test]
    fn pretty_breaks_long_containers() {
        let long = Value::List((0..40).map(Value::Int).collect());
        let text = long.pretty();
        assert!(text.starts_with("[\n    0,\n"));
        assert!(text.ends_with("39,\n]"));
        assert_eq!(Value::Int(3).pretty(), "3");
    }
}
