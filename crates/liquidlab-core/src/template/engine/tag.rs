//! Tag classification
//!
//! Turns a [`Tag`] into a [`TagOp`]: the keyword decides the operation and
//! the remainder is checked for presence, absence or shape.

use std::fmt;

use crate::template::error::TemplateError;
use crate::template::expr::is_identifier;
use crate::template::expr::split::split_once;

use super::helpers::split_keyword;
use super::tokenize::{Tag, TagKind};

/// Kinds of region opened by a block tag and closed by `end<kind>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    If,
    Unless,
    For,
    While,
    Case,
    Capture,
    Raw,
    Comment,
    Paginate,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Unless => "unless",
            BlockKind::For => "for",
            BlockKind::While => "while",
            BlockKind::Case => "case",
            BlockKind::Capture => "capture",
            BlockKind::Raw => "raw",
            BlockKind::Comment => "comment",
            BlockKind::Paginate => "paginate",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "if" => BlockKind::If,
            "unless" => BlockKind::Unless,
            "for" => BlockKind::For,
            "while" => BlockKind::While,
            "case" => BlockKind::Case,
            "capture" => BlockKind::Capture,
            "raw" => BlockKind::Raw,
            "comment" => BlockKind::Comment,
            "paginate" => BlockKind::Paginate,
            _ => return None,
        })
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a tag asks the compiler to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagOp {
    /// `{{ expr }}`
    Output(String),
    /// `{# ... #}`
    Note,
    If(String),
    Elif(String),
    Else,
    Unless(String),
    For(String),
    While(String),
    Case(String),
    When(String),
    Capture(String),
    Raw,
    Comment { sign: String },
    Paginate(Option<String>),
    End(BlockKind),
    Break,
    Continue,
    Assign { name: String, value: String },
    Increment(String),
    Decrement(String),
    Include(String),
    Python(String),
}

fn syntax(message: impl Into<String>, tag: &Tag) -> TemplateError {
    TemplateError::syntax(message, tag.line, tag.source.clone())
}

fn required(keyword: &str, rest: &str, tag: &Tag) -> Result<String, TemplateError> {
    if rest.is_empty() {
        return Err(syntax(format!("'{}' requires an argument", keyword), tag));
    }
    Ok(rest.to_string())
}

fn forbidden(keyword: &str, rest: &str, tag: &Tag) -> Result<(), TemplateError> {
    if !rest.is_empty() {
        return Err(syntax(format!("'{}' takes no arguments", keyword), tag));
    }
    Ok(())
}

fn variable_name(keyword: &str, rest: &str, tag: &Tag) -> Result<String, TemplateError> {
    let name = required(keyword, rest, tag)?;
    if !is_identifier(&name) {
        return Err(syntax(format!("Invalid variable name '{}'", name), tag));
    }
    Ok(name)
}

/// True when `tag` is exactly `{% end<kind> %}`
pub(crate) fn is_end_of(tag: &Tag, kind: BlockKind) -> bool {
    tag.kind == TagKind::Statement
        && tag
            .inner
            .strip_prefix("end")
            .is_some_and(|name| name == kind.name())
}

pub(crate) fn classify(tag: &Tag) -> Result<TagOp, TemplateError> {
    match tag.kind {
        TagKind::Expression => {
            if tag.inner.is_empty() {
                return Err(syntax("Empty expression tag", tag));
            }
            return Ok(TagOp::Output(tag.inner.clone()));
        }
        TagKind::Comment => return Ok(TagOp::Note),
        TagKind::Statement => {}
    }

    let (keyword, rest) = split_keyword(&tag.inner);
    let op = match keyword {
        "break" => {
            forbidden(keyword, rest, tag)?;
            TagOp::Break
        }
        "continue" => {
            forbidden(keyword, rest, tag)?;
            TagOp::Continue
        }
        "raw" => {
            forbidden(keyword, rest, tag)?;
            TagOp::Raw
        }
        "if" => TagOp::If(required(keyword, rest, tag)?),
        "elif" | "elsif" | "elseif" => TagOp::Elif(required(keyword, rest, tag)?),
        "else" => {
            let (next, cond) = split_keyword(rest);
            match next {
                "" => TagOp::Else,
                "if" => TagOp::Elif(required("else if", cond, tag)?),
                _ => return Err(syntax("'else' takes no arguments", tag)),
            }
        }
        "unless" => TagOp::Unless(required(keyword, rest, tag)?),
        "for" => TagOp::For(required(keyword, rest, tag)?),
        "while" => TagOp::While(required(keyword, rest, tag)?),
        "case" => TagOp::Case(required(keyword, rest, tag)?),
        "when" => TagOp::When(required(keyword, rest, tag)?),
        "capture" => TagOp::Capture(variable_name(keyword, rest, tag)?),
        "python" => TagOp::Python(required(keyword, rest, tag)?),
        "paginate" => TagOp::Paginate((!rest.is_empty()).then(|| rest.to_string())),
        "comment" => TagOp::Comment {
            sign: if rest.is_empty() { "#" } else { rest }.to_string(),
        },
        "assign" => {
            let (name, value) = split_once(rest, '=')
                .filter(|(_, value)| !value.is_empty() && !value.starts_with('='))
                .ok_or_else(|| syntax("Invalid assign, expected 'assign name = value'", tag))?;
            if !is_identifier(name) {
                return Err(syntax(format!("Invalid variable name '{}'", name), tag));
            }
            TagOp::Assign {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
        "increment" => TagOp::Increment(variable_name(keyword, rest, tag)?),
        "decrement" => TagOp::Decrement(variable_name(keyword, rest, tag)?),
        "include" => TagOp::Include(required(keyword, rest, tag)?),
        _ => match keyword.strip_prefix("end") {
            Some(name) => {
                let kind = BlockKind::from_name(name)
                    .ok_or_else(|| syntax(format!("Unknown end tag: {}", keyword), tag))?;
                forbidden(keyword, rest, tag)?;
                TagOp::End(kind)
            }
            None => return Err(syntax(format!("Unknown tag: {}", keyword), tag)),
        },
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(inner: &str) -> Tag {
        Tag {
            kind: TagKind::Statement,
            inner: inner.to_string(),
            line: 3,
            source: format!("{{% {} %}}", inner),
        }
    }

    fn classify_str(inner: &str) -> Result<TagOp, TemplateError> {
        classify(&statement(inner))
    }

    #[test]
    fn test_classify_block_openers() {
        assert_eq!(classify_str("if x > 1").unwrap(), TagOp::If("x > 1".into()));
        assert_eq!(classify_str("for i in items").unwrap(), TagOp::For("i in items".into()));
        assert_eq!(classify_str("capture title").unwrap(), TagOp::Capture("title".into()));
    }

    #[test]
    fn test_classify_elif_spellings() {
        for inner in ["elif x", "elsif x", "elseif x", "else if x"] {
            assert_eq!(classify_str(inner).unwrap(), TagOp::Elif("x".into()), "{}", inner);
        }
        assert_eq!(classify_str("else").unwrap(), TagOp::Else);
    }

    #[test]
    fn test_classify_assign() {
        assert_eq!(
            classify_str("assign total = a == b").unwrap(),
            TagOp::Assign {
                name: "total".into(),
                value: "a == b".into()
            }
        );
        assert!(classify_str("assign total").is_err());
        assert!(classify_str("assign 1x = 2").is_err());
    }

    #[test]
    fn test_classify_comment_sign() {
        assert_eq!(classify_str("comment").unwrap(), TagOp::Comment { sign: "#".into() });
        assert_eq!(classify_str("comment //").unwrap(), TagOp::Comment { sign: "//".into() });
    }

    #[test]
    fn test_classify_paginate_optional() {
        assert_eq!(classify_str("paginate").unwrap(), TagOp::Paginate(None));
        assert_eq!(
            classify_str("paginate items by 5").unwrap(),
            TagOp::Paginate(Some("items by 5".into()))
        );
    }

    #[test]
    fn test_missing_and_extra_arguments() {
        match classify_str("if") {
            Err(TemplateError::Syntax { message, line, .. }) => {
                assert!(message.contains("requires an argument"));
                assert_eq!(line, 3);
            }
            other => panic!("Expected Syntax error, got {:?}", other),
        }
        assert!(classify_str("break now").is_err());
        assert!(classify_str("else what").is_err());
        assert!(classify_str("increment").is_err());
    }

    #[test]
    fn test_unknown_tags() {
        match classify_str("endfoo") {
            Err(TemplateError::Syntax { message, .. }) => {
                assert_eq!(message, "Unknown end tag: endfoo")
            }
            other => panic!("Expected Syntax error, got {:?}", other),
        }
        match classify_str("frobnicate x") {
            Err(TemplateError::Syntax { message, .. }) => {
                assert_eq!(message, "Unknown tag: frobnicate")
            }
            other => panic!("Expected Syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_end_tags() {
        assert_eq!(classify_str("endcapture").unwrap(), TagOp::End(BlockKind::Capture));
        assert!(is_end_of(&statement("endraw"), BlockKind::Raw));
        assert!(!is_end_of(&statement("endraw x"), BlockKind::Raw));
        assert!(!is_end_of(&statement("endcomment"), BlockKind::Raw));
    }

    #[test]
    fn test_expression_and_note_tags() {
        let tag = Tag {
            kind: TagKind::Expression,
            inner: "x | @upcase".into(),
            line: 1,
            source: "{{ x | @upcase }}".into(),
        };
        assert_eq!(classify(&tag).unwrap(), TagOp::Output("x | @upcase".into()));

        let note = Tag {
            kind: TagKind::Comment,
            inner: "anything {% here".into(),
            line: 1,
            source: "{# anything {% here #}".into(),
        };
        assert_eq!(classify(&note).unwrap(), TagOp::Note);
    }
}
