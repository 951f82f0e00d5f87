//! Tokenization for template engine
//!
//! Splits template text into literal runs and `{{ }}`, `{% %}`, `{# #}` tags,
//! applying the whitespace control of the selected [`Mode`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::helpers::{count_newlines, split_keyword, trim_blank_end, trim_line_start};

/// Whitespace control flavour
///
/// | mode      | `{{ }}`          | `{% %}` and `{# #}` |
/// |-----------|------------------|---------------------|
/// | `loose`   | `-` markers only | `-` markers only    |
/// | `mixed`   | never trimmed    | always trimmed      |
/// | `compact` | always trimmed   | always trimmed      |
///
/// Trimming before a tag drops spaces and tabs; trimming after it drops
/// spaces, tabs and one line break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Loose,
    Mixed,
    Compact,
}

impl Mode {
    /// (trim before, trim after) for a tag with the given `-` markers
    fn trims(self, kind: TagKind, left_marker: bool, right_marker: bool) -> (bool, bool) {
        match (self, kind) {
            (Mode::Loose, _) => (left_marker, right_marker),
            (Mode::Mixed, TagKind::Expression) => (false, false),
            (Mode::Mixed, _) | (Mode::Compact, _) => (true, true),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Loose => "loose",
            Mode::Mixed => "mixed",
            Mode::Compact => "compact",
        })
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loose" => Ok(Mode::Loose),
            "mixed" => Ok(Mode::Mixed),
            "compact" => Ok(Mode::Compact),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Settings read from a leading `{% mode ... %}` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Directive {
    pub mode: Option<Mode>,
    pub debug: Option<bool>,
}

/// Strip an optional mode directive off the first line
///
/// Returns the directive, the remaining text and the line number the
/// remaining text starts on.
pub(crate) fn split_directive(text: &str) -> (Directive, &str, usize) {
    let first_end = text.find('\n').map_or(text.len(), |i| i + 1);
    let first = text[..first_end].trim();

    let inner = match first
        .strip_prefix("{%")
        .and_then(|rest| rest.strip_suffix("%}"))
    {
        Some(inner) => inner.trim_matches('-').trim(),
        None => return (Directive::default(), text, 1),
    };
    let (keyword, words) = split_keyword(inner);
    if keyword != "mode" {
        return (Directive::default(), text, 1);
    }

    let mut directive = Directive::default();
    for word in words.split_whitespace() {
        match word {
            "debug" => directive.debug = Some(true),
            "nodebug" => directive.debug = Some(false),
            other => match other.parse::<Mode>() {
                Ok(mode) => directive.mode = Some(mode),
                Err(_) => tracing::warn!(word = other, "ignoring unknown mode directive word"),
            },
        }
    }
    (directive, &text[first_end..], 2)
}

/// Tag delimiter family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    /// `{{ expr }}`
    Expression,
    /// `{% keyword args %}`
    Statement,
    /// `{# note #}`
    Comment,
}

impl TagKind {
    fn from_open(byte: u8) -> Option<Self> {
        match byte {
            b'{' => Some(TagKind::Expression),
            b'%' => Some(TagKind::Statement),
            b'#' => Some(TagKind::Comment),
            _ => None,
        }
    }

    fn close(self) -> &'static str {
        match self {
            TagKind::Expression => "}}",
            TagKind::Statement => "%}",
            TagKind::Comment => "#}",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A tag with its markers and delimiters removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
    pub kind: TagKind,
    /// Trimmed text between the delimiters
    pub inner: String,
    /// Line number where the tag starts
    pub line: usize,
    /// The tag exactly as written
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Literal { text: String, line: usize },
    Tag(Tag),
}

impl Token {
    pub fn line(&self) -> usize {
        match self {
            Token::Literal { line, .. } => *line,
            Token::Tag(tag) => tag.line,
        }
    }
}

/// Byte span of a tag in the template text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TagSpan {
    pub kind: TagKind,
    /// Position of the opening delimiter
    pub start: usize,
    /// Position just past the closing delimiter
    pub end: usize,
    pub line: usize,
}

/// Iterator over tag spans in a template string
///
/// A tag closes at the first closing delimiter of its family. An opening
/// delimiter without one is literal text and scanning resumes right after
/// its first byte. Once a family has no closing delimiter left, later
/// openers of that family are skipped without searching again, which keeps
/// the scan linear.
pub(crate) struct TokenStream<'a> {
    text: &'a str,
    /// Next byte to scan
    pos: usize,
    /// Bytes before `counted` have had their newlines counted into `line`
    counted: usize,
    line: usize,
    exhausted: [bool; 3],
}

impl<'a> TokenStream<'a> {
    pub fn new(text: &'a str, first_line: usize) -> Self {
        Self {
            text,
            pos: 0,
            counted: 0,
            line: first_line,
            exhausted: [false; 3],
        }
    }

    fn advance_line_to(&mut self, pos: usize) -> usize {
        self.line += count_newlines(&self.text[self.counted..pos]);
        self.counted = pos;
        self.line
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = TagSpan;

    fn next(&mut self) -> Option<TagSpan> {
        let bytes = self.text.as_bytes();
        loop {
            let open = self.pos + self.text.get(self.pos..)?.find('{')?;
            self.pos = open + 1;

            let kind = match bytes.get(open + 1).copied().and_then(TagKind::from_open) {
                Some(kind) if !self.exhausted[kind.index()] => kind,
                _ => continue,
            };

            let content_start = open + 2;
            match self.text[content_start..].find(kind.close()) {
                Some(rel) => {
                    let end = content_start + rel + 2;
                    let line = self.advance_line_to(open);
                    self.pos = end;
                    return Some(TagSpan {
                        kind,
                        start: open,
                        end,
                        line,
                    });
                }
                None => self.exhausted[kind.index()] = true,
            }
        }
    }
}

/// Remove `-` trim markers, returning (inner, left marker, right marker)
fn strip_markers(content: &str) -> (&str, bool, bool) {
    let (content, left) = match content.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (content, false),
    };
    let (content, right) = match content.strip_suffix('-') {
        Some(rest) => (rest, true),
        None => (content, false),
    };
    (content.trim(), left, right)
}

/// Split `text` into literal and tag tokens
///
/// `first_line` is the line number `text` starts on.
pub(crate) fn tokenize(text: &str, mode: Mode, first_line: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    let mut line = first_line;
    let mut trim_next = false;

    for span in TokenStream::new(text, first_line) {
        let source = &text[span.start..span.end];
        let (inner, left, right) = strip_markers(&source[2..source.len() - 2]);
        let (trim_before, trim_after) = mode.trims(span.kind, left, right);

        push_literal(&mut tokens, &text[cursor..span.start], line, trim_next, trim_before);
        tokens.push(Token::Tag(Tag {
            kind: span.kind,
            inner: inner.to_string(),
            line: span.line,
            source: source.to_string(),
        }));

        cursor = span.end;
        line = span.line + count_newlines(source);
        trim_next = trim_after;
    }

    push_literal(&mut tokens, &text[cursor..], line, trim_next, false);
    tokens
}

fn push_literal(tokens: &mut Vec<Token>, raw: &str, line: usize, trim_start: bool, trim_end: bool) {
    let mut literal = raw;
    let mut line = line;
    if trim_start {
        literal = trim_line_start(literal);
        line += count_newlines(&raw[..raw.len() - literal.len()]);
    }
    if trim_end {
        literal = trim_blank_end(literal);
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal {
            text: literal.to_string(),
            line,
        });
    }
}
