//! Recursive descent parser for the expression grammar
//!
//! Precedence, loosest first:
//!
//! ```text
//! lambda params: expr
//! or
//! and
//! not
//! == != < <= > >= in, not in, contains
//! + -
//! * / %
//! unary -
//! postfix  .name  .name(args)  [index]  [start:end]  (args)
//! primary  literal  name  (group)  (a, b)  (a..b)  [list]  {map}
//! ```
//!
//! A parenthesized group that holds an unguarded `|` is a full filter chain.

use crate::template::filters::FilterRegistry;
use crate::template::value::Value;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::filter::compile_expression;
use super::lexer::{lex, Lexeme, Tok};
use super::ParseError;

pub(crate) struct Parser<'a> {
    text: &'a str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    filters: &'a FilterRegistry,
}

/// Parse a complete expression (no top-level pipes)
pub(crate) fn parse_expr(text: &str, filters: &FilterRegistry) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text, filters)?;
    if parser.at_end() {
        return Err(ParseError("Empty expression".to_string()));
    }
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a comma-separated argument list; empty text yields no arguments
pub(crate) fn parse_args(text: &str, filters: &FilterRegistry) -> Result<Vec<Expr>, ParseError> {
    let mut parser = Parser::new(text, filters)?;
    let mut args = Vec::new();
    while !parser.at_end() {
        args.push(parser.expression()?);
        if !parser.eat(&Tok::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(args)
}

/// Parse the arguments of a registry filter: `a, b` or `a, b == rhs`
///
/// Each argument stops below the comparison level, so a comparison or a
/// boolean operator after the last argument applies to the filter's
/// result. Returns the arguments and the byte offset of that tail, if any.
pub(crate) fn parse_filter_args(
    text: &str,
    filters: &FilterRegistry,
) -> Result<(Vec<Expr>, Option<usize>), ParseError> {
    let mut parser = Parser::new(text, filters)?;
    let mut args = Vec::new();
    while !parser.at_end() {
        args.push(if parser.peek_keyword("lambda") {
            parser.expression()?
        } else {
            parser.additive()?
        });
        if !parser.eat(&Tok::Comma) {
            break;
        }
    }
    if parser.at_end() {
        return Ok((args, None));
    }
    if parser.at_condition_operator() {
        return Ok((args, parser.lexemes.get(parser.pos).map(|l| l.start)));
    }
    Err(parser.unexpected("',' or end of filter arguments"))
}

/// Continue a condition whose left operand is `left`: `== 3 and ready`
pub(crate) fn parse_condition_tail(
    left: Expr,
    text: &str,
    filters: &FilterRegistry,
) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text, filters)?;
    if !parser.at_condition_operator() {
        return Err(parser.unexpected("a comparison, 'and' or 'or'"));
    }
    let expr = parser.condition_from(left)?;
    parser.expect_end()?;
    Ok(expr)
}

/// Apply postfix subscripts such as `[0]` or `[1:3].name` to `target`
pub(crate) fn parse_postfix_on(
    target: Expr,
    text: &str,
    filters: &FilterRegistry,
) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text, filters)?;
    let expr = parser.postfix(target)?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse `lambda a, b: body` into its parameters and body
pub(crate) fn parse_lambda(
    text: &str,
    filters: &FilterRegistry,
) -> Result<(Vec<String>, Expr), ParseError> {
    match parse_expr(text, filters)? {
        Expr::Lambda { params, body } => Ok((params, *body)),
        _ => Err(ParseError(format!("Expected a lambda, got '{}'", text))),
    }
}

/// Parse `a, b in expr` loop headers into target names and iterable
pub(crate) fn parse_loop_header(
    text: &str,
    filters: &FilterRegistry,
) -> Result<(Vec<String>, Expr), ParseError> {
    let mut parser = Parser::new(text, filters)?;
    let mut targets = vec![parser.ident()?];
    while parser.eat(&Tok::Comma) {
        targets.push(parser.ident()?);
    }
    match parser.advance() {
        Some(Lexeme {
            tok: Tok::Ident(kw),
            end,
            ..
        }) if kw == "in" => {
            let iterable = compile_expression(text[end..].trim(), filters)?;
            Ok((targets, iterable))
        }
        _ => Err(ParseError(format!(
            "Expected 'in' after loop variables in '{}'",
            text
        ))),
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !KEYWORDS.contains(&name)
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "contains", "lambda"];

impl<'a> Parser<'a> {
    fn new(text: &'a str, filters: &'a FilterRegistry) -> Result<Self, ParseError> {
        Ok(Self {
            text,
            lexemes: lex(text)?,
            pos: 0,
            filters,
        })
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.lexemes.get(self.pos).map(|l| &l.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.lexemes.get(self.pos + offset).map(|l| &l.tok)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(name)) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ParseError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.lexemes.get(self.pos) {
            Some(lexeme) => ParseError(format!(
                "Expected {} but found '{}' in '{}'",
                expected,
                &self.text[lexeme.start..lexeme.end],
                self.text
            )),
            None => ParseError(format!(
                "Expected {} but reached the end of '{}'",
                expected, self.text
            )),
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Ident(name)) if is_identifier(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn at_condition_operator(&self) -> bool {
        match self.peek() {
            Some(Tok::EqEq | Tok::NotEq | Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge) => true,
            Some(Tok::Ident(kw)) => match kw.as_str() {
                "in" | "contains" | "and" | "or" => true,
                "not" => matches!(self.peek_at(1), Some(Tok::Ident(n)) if n == "in"),
                _ => false,
            },
            _ => false,
        }
    }

    /// Resume the `or` > `and` > comparison ladder with `left` as the first operand
    fn condition_from(&mut self, mut left: Expr) -> Result<Expr, ParseError> {
        while let Some(op) = self.comparison_op() {
            left = Expr::binary(op, left, self.additive()?);
        }
        while self.eat_keyword("and") {
            left = Expr::binary(BinaryOp::And, left, self.not()?);
        }
        while self.eat_keyword("or") {
            left = Expr::binary(BinaryOp::Or, left, self.and()?);
        }
        Ok(left)
    }

    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("lambda") {
            let mut params = Vec::new();
            if !self.eat(&Tok::Colon) {
                params.push(self.ident()?);
                while self.eat(&Tok::Comma) {
                    params.push(self.ident()?);
                }
                self.expect(Tok::Colon, "':' after lambda parameters")?;
            }
            let body = self.expression()?;
            return Ok(Expr::Lambda {
                params,
                body: Box::new(body),
            });
        }
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::binary(BinaryOp::Or, left, self.and()?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Expr::binary(BinaryOp::And, left, self.not()?);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            return Ok(Expr::not(self.not()?));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            Tok::EqEq => BinaryOp::Eq,
            Tok::NotEq => BinaryOp::Ne,
            Tok::Lt => BinaryOp::Lt,
            Tok::Le => BinaryOp::Le,
            Tok::Gt => BinaryOp::Gt,
            Tok::Ge => BinaryOp::Ge,
            Tok::Ident(kw) if kw == "in" => BinaryOp::In,
            Tok::Ident(kw) if kw == "contains" => BinaryOp::Contains,
            Tok::Ident(kw)
                if kw == "not" && matches!(self.peek_at(1), Some(Tok::Ident(n)) if n == "in") =>
            {
                self.pos += 1;
                BinaryOp::NotIn
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        while let Some(op) = self.comparison_op() {
            left = Expr::binary(op, left, self.additive()?);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::binary(op, left, self.multiplicative()?);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::binary(op, left, self.unary()?);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::Minus) {
            let operand = self.unary()?;
            return Ok(match operand {
                Expr::Literal(Value::Int(i)) => Expr::Literal(Value::Int(-i)),
                Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                operand => Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
            });
        }
        if self.eat(&Tok::Plus) {
            return self.unary();
        }
        let primary = self.primary()?;
        self.postfix(primary)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        while !self.eat(&Tok::RParen) {
            args.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen, "')' after arguments")?;
                break;
            }
        }
        Ok(args)
    }

    pub(crate) fn postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(Lexeme {
                            tok: Tok::Ident(name),
                            ..
                        }) => name,
                        _ => return Err(self.unexpected("an attribute name after '.'")),
                    };
                    expr = if self.eat(&Tok::LParen) {
                        Expr::Method {
                            target: Box::new(expr),
                            name,
                            args: self.call_args()?,
                        }
                    } else {
                        Expr::Attribute {
                            target: Box::new(expr),
                            name,
                        }
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    expr = self.subscript(expr)?;
                }
                Some(Tok::LParen) => {
                    self.pos += 1;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args: self.call_args()?,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr, ParseError> {
        let start = if self.peek() == Some(&Tok::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        if self.eat(&Tok::Colon) {
            let end = if self.peek() == Some(&Tok::RBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.expect(Tok::RBracket, "']' after slice")?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start,
                end,
            });
        }

        self.expect(Tok::RBracket, "']' after index")?;
        match start {
            Some(index) => Ok(Expr::Index {
                target: Box::new(target),
                index,
            }),
            None => Err(ParseError("Empty subscript".to_string())),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let lexeme = match self.advance() {
            Some(lexeme) => lexeme,
            None => return Err(self.unexpected("a value")),
        };

        match lexeme.tok {
            Tok::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Tok::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Tok::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Tok::Ident(name) if !KEYWORDS.contains(&name.as_str()) => Ok(Expr::Variable(name)),
            Tok::LParen => self.group(lexeme.end),
            Tok::LBracket => {
                let mut items = Vec::new();
                while !self.eat(&Tok::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBracket, "']' after list items")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&Tok::RBrace) {
                    let key = self.expression()?;
                    self.expect(Tok::Colon, "':' after map key")?;
                    entries.push((key, self.expression()?));
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBrace, "'}' after map entries")?;
                        break;
                    }
                }
                Ok(Expr::Map(entries))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a value"))
            }
        }
    }

    /// Index of the `)` closing the group whose contents start at `self.pos`,
    /// and whether a `|` appears directly inside it
    fn group_extent(&self) -> Option<(usize, bool)> {
        let mut depth = 0usize;
        let mut piped = false;
        for (i, lexeme) in self.lexemes.iter().enumerate().skip(self.pos) {
            match lexeme.tok {
                Tok::LParen | Tok::LBracket | Tok::LBrace => depth += 1,
                Tok::RParen if depth == 0 => return Some((i, piped)),
                Tok::RParen | Tok::RBracket | Tok::RBrace => depth = depth.saturating_sub(1),
                Tok::Pipe if depth == 0 => piped = true,
                _ => {}
            }
        }
        None
    }

    fn group(&mut self, content_start: usize) -> Result<Expr, ParseError> {
        if let Some((close, true)) = self.group_extent() {
            let inner = &self.text[content_start..self.lexemes[close].start];
            let expr = compile_expression(inner, self.filters)?;
            self.pos = close + 1;
            return Ok(expr);
        }

        if self.eat(&Tok::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }

        let first = self.expression()?;
        if self.eat(&Tok::DotDot) {
            let end = self.expression()?;
            self.expect(Tok::RParen, "')' after range")?;
            return Ok(Expr::Range(Box::new(first), Box::new(end)));
        }
        if !self.eat(&Tok::Comma) {
            self.expect(Tok::RParen, "')'")?;
            return Ok(first);
        }

        let mut items = vec![first];
        while !self.eat(&Tok::RParen) {
            items.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen, "')' after tuple items")?;
                break;
            }
        }
        Ok(Expr::Tuple(items))
    }
}
