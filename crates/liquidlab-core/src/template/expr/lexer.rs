//! Lexer for the expression sub-language

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifiers and keywords (`and`, `or`, `not`, `in`, `contains`, `lambda`)
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    DotDot,
    Pipe,
    /// Only meaningful inside filter chains
    At,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub tok: Tok,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn lex(text: &str) -> Result<Vec<Lexeme>, ParseError> {
    let bytes = text.as_bytes();
    let mut lexemes = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let tok = if c.is_ascii_digit() {
            let (tok, end) = lex_number(text, pos)?;
            pos = end;
            tok
        } else if c == b'\'' || c == b'"' {
            let (s, end) = lex_string(text, pos)?;
            pos = end;
            Tok::Str(s)
        } else if c == b'_' || c.is_ascii_alphabetic() {
            while pos < bytes.len() && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric()) {
                pos += 1;
            }
            Tok::Ident(text[start..pos].to_string())
        } else {
            let next = bytes.get(pos + 1).copied();
            let (tok, width) = match (c, next) {
                (b'.', Some(b'.')) => (Tok::DotDot, 2),
                (b'=', Some(b'=')) => (Tok::EqEq, 2),
                (b'!', Some(b'=')) => (Tok::NotEq, 2),
                (b'<', Some(b'=')) => (Tok::Le, 2),
                (b'>', Some(b'=')) => (Tok::Ge, 2),
                // `<>` is accepted as a synonym of `!=`
                (b'<', Some(b'>')) => (Tok::NotEq, 2),
                (b'(', _) => (Tok::LParen, 1),
                (b')', _) => (Tok::RParen, 1),
                (b'[', _) => (Tok::LBracket, 1),
                (b']', _) => (Tok::RBracket, 1),
                (b'{', _) => (Tok::LBrace, 1),
                (b'}', _) => (Tok::RBrace, 1),
                (b',', _) => (Tok::Comma, 1),
                (b':', _) => (Tok::Colon, 1),
                (b'.', _) => (Tok::Dot, 1),
                (b'|', _) => (Tok::Pipe, 1),
                (b'@', _) => (Tok::At, 1),
                (b'+', _) => (Tok::Plus, 1),
                (b'-', _) => (Tok::Minus, 1),
                (b'*', _) => (Tok::Star, 1),
                (b'/', _) => (Tok::Slash, 1),
                (b'%', _) => (Tok::Percent, 1),
                (b'<', _) => (Tok::Lt, 1),
                (b'>', _) => (Tok::Gt, 1),
                _ => {
                    let ch = text[pos..].chars().next().unwrap_or('?');
                    return Err(ParseError(format!(
                        "Unexpected character '{}' at offset {} in '{}'",
                        ch, pos, text
                    )));
                }
            };
            pos += width;
            tok
        };

        lexemes.push(Lexeme {
            tok,
            start,
            end: pos,
        });
    }

    Ok(lexemes)
}

fn lex_number(text: &str, start: usize) -> Result<(Tok, usize), ParseError> {
    let bytes = text.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'_') {
        pos += 1;
    }

    // `1.5` is a float, `1..5` is a range and `1.abs` an attribute access
    let is_float = pos + 1 < bytes.len() && bytes[pos] == b'.' && bytes[pos + 1].is_ascii_digit();
    if is_float {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            return parse_float(text, start, pos);
        }
    }

    if is_float {
        return parse_float(text, start, pos);
    }
    let digits = text[start..pos].replace('_', "");
    digits
        .parse::<i64>()
        .map(|i| (Tok::Int(i), pos))
        .map_err(|e| ParseError(format!("Invalid integer '{}': {}", &text[start..pos], e)))
}

fn parse_float(text: &str, start: usize, end: usize) -> Result<(Tok, usize), ParseError> {
    let digits = text[start..end].replace('_', "");
    digits
        .parse::<f64>()
        .map(|f| (Tok::Float(f), end))
        .map_err(|e| ParseError(format!("Invalid number '{}': {}", &text[start..end], e)))
}

fn lex_string(text: &str, start: usize) -> Result<(String, usize), ParseError> {
    let mut chars = text[start..].char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(ParseError("Expected string literal".to_string())),
    };
    let mut out = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let escaped = match chars.next() {
                    Some((_, e)) => e,
                    None => break,
                };
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            c if c == quote => return Ok((out, start + i + c.len_utf8())),
            c => out.push(c),
        }
    }

    Err(ParseError(format!(
        "Unterminated string literal in '{}'",
        text
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(text: &str) -> Vec<Tok> {
        lex(text).unwrap().into_iter().map(|l| l.tok).collect()
    }

    #[test]
    fn test_lex_range_is_not_float() {
        assert_eq!(toks("1..3"), vec![Tok::Int(1), Tok::DotDot, Tok::Int(3)]);
        assert_eq!(toks("1.5"), vec![Tok::Float(1.5)]);
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(toks(r#""a\"b\n""#), vec![Tok::Str("a\"b\n".to_string())]);
        assert_eq!(toks("'it''s'"), vec![Tok::Str("it".into()), Tok::Str("s".into())]);
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            toks("a <= b != c"),
            vec![
                Tok::Ident("a".into()),
                Tok::Le,
                Tok::Ident("b".into()),
                Tok::NotEq,
                Tok::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_lex_spans() {
        let lexemes = lex("ab + 'c'").unwrap();
        assert_eq!((lexemes[0].start, lexemes[0].end), (0, 2));
        assert_eq!((lexemes[2].start, lexemes[2].end), (5, 8));
    }

    #[test]
    fn test_lex_rejects_unknown_character() {
        assert!(lex("a ; b").is_err());
        assert!(lex("'open").is_err());
    }
}
