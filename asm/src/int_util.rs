//! Numeric literal decoding: the grammar recognizes decimal, `0x`/`0o`/`0b`
//! literals and floats as a handful of distinct atomic rules; this module
//! turns those tokens into the `i64`/`u64`/`f64` the rest of the crate
//! works with.

use crate::parser::Rule;
use edumips64::error::ParseError;
use pest::iterators::Pair;

fn bad_token(pair: &Pair<Rule>, message: &str) -> ParseError {
    let (line, _) = pair.as_span().start_pos().line_col();
    ParseError::BadToken {
        line: line as u32,
        token: format!("{}: {}", pair.as_str(), message),
    }
}

fn radix_digits(text: &str) -> (&str, u32) {
    let lower = text.as_bytes();
    if lower.len() >= 2 && lower[0] == b'0' {
        match lower[1] {
            b'x' | b'X' => return (&text[2..], 16),
            b'o' | b'O' => return (&text[2..], 8),
            b'b' | b'B' => return (&text[2..], 2),
            _ => {}
        }
    }
    (text, 10)
}

/// Parses an `int` rule (signed) from its resolved inner literal pair.
pub fn process_int(pair: Pair<Rule>) -> Result<i64, ParseError> {
    let inner = pair.clone().into_inner().next().unwrap();
    let (digits, radix) = radix_digits(inner.as_str());
    i64::from_str_radix(digits, radix).map_err(|err| bad_token(&pair, &err.to_string()))
}

/// Parses a `uint` rule (unsigned) from its resolved inner literal pair.
pub fn process_uint(pair: Pair<Rule>) -> Result<u64, ParseError> {
    let inner = pair.clone().into_inner().next().unwrap();
    let (digits, radix) = radix_digits(inner.as_str());
    u64::from_str_radix(digits, radix).map_err(|err| bad_token(&pair, &err.to_string()))
}

/// Parses a `float` rule. The rule is atomic (`@`), so `pair.as_str()` is
/// the whole literal with no further inner tokens to descend into.
pub fn process_float(pair: Pair<Rule>) -> Result<f64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|_| bad_token(&pair, "not a valid floating point literal"))
}

/// Decodes the escape sequences in a parsed `string` rule's inner text.
/// Only `\"` and `\\` are meaningful escapes; anything else after a
/// backslash is passed through unchanged (matching the grammar's permissive
/// `escape` rule).
pub fn process_string(pair: Pair<Rule>) -> Vec<u8> {
    let inner = pair.into_inner().next().unwrap();
    let mut bytes = Vec::with_capacity(inner.as_str().len());
    let mut chars = inner.as_str().chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                bytes.push(next as u8);
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::AsmParser;
    use pest::Parser;

    fn parse_rule(rule: Rule, input: &str) -> Pair<Rule> {
        AsmParser::parse(rule, input).unwrap().next().unwrap()
    }

    #[test]
    fn hex_int_parses_case_insensitively() {
        let pair = parse_rule(Rule::int, "0XFF");
        assert_eq!(process_int(pair).unwrap(), 255);
    }

    #[test]
    fn negative_decimal_int() {
        let pair = parse_rule(Rule::int, "-123");
        assert_eq!(process_int(pair).unwrap(), -123);
    }

    #[test]
    fn binary_uint() {
        let pair = parse_rule(Rule::uint, "0b1010");
        assert_eq!(process_uint(pair).unwrap(), 10);
    }

    #[test]
    fn float_literal() {
        let pair = parse_rule(Rule::float, "3.25");
        assert_eq!(process_float(pair).unwrap(), 3.25);
    }
}
