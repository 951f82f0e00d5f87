//! Block-stack compiler
//!
//! Feeds tokens through an explicit stack of open [`Frame`]s and emits the
//! intermediate program. Literal text and `{{ }}` results accumulate as
//! pending fragments and are flushed as a single append (one fragment) or
//! extend (several) before any control instruction.

use std::path::Path;

use crate::template::error::TemplateError;
use crate::template::expr::split::{split, split_once};
use crate::template::expr::{
    compile_expression, is_identifier, parse_loop_header, BinaryOp, Expr, ParseError,
};
use crate::template::filters::FilterRegistry;

use super::helpers::prefix_lines;
use super::include::{parse_include, resolve_path, IncludeChain, TemplateLoader};
use super::program::{Fragment, Op, Program, ProgramBuilder};
use super::tag::{classify, is_end_of, BlockKind, TagOp};
use super::tokenize::{split_directive, tokenize, Mode, Tag, Token};

/// Everything a compilation needs besides the text
pub(crate) struct CompileContext<'a> {
    pub filters: &'a FilterRegistry,
    pub loader: &'a dyn TemplateLoader,
    pub include_dir: Option<&'a Path>,
    pub include_extension: &'a str,
    pub max_include_depth: usize,
    pub default_mode: Mode,
    pub debug: bool,
}

/// Result of compiling one template text
pub(crate) struct Compiled {
    pub program: Program,
    pub mode: Mode,
    pub debug: bool,
}

#[derive(Debug)]
enum Block {
    If { has_else: bool },
    Unless { has_else: bool },
    For,
    While,
    Case {
        subject: Expr,
        seen_when: bool,
        has_else: bool,
    },
    Capture { name: String },
    Raw { text: String },
    Comment { sign: String, text: String },
    Paginate,
}

impl Block {
    fn kind(&self) -> BlockKind {
        match self {
            Block::If { .. } => BlockKind::If,
            Block::Unless { .. } => BlockKind::Unless,
            Block::For => BlockKind::For,
            Block::While => BlockKind::While,
            Block::Case { .. } => BlockKind::Case,
            Block::Capture { .. } => BlockKind::Capture,
            Block::Raw { .. } => BlockKind::Raw,
            Block::Comment { .. } => BlockKind::Comment,
            Block::Paginate => BlockKind::Paginate,
        }
    }
}

/// An open block with the tag that opened it
#[derive(Debug)]
struct Frame {
    block: Block,
    line: usize,
    source: String,
}

pub(crate) fn compile_program(
    text: &str,
    ctx: &CompileContext<'_>,
    chain: &mut IncludeChain,
) -> Result<Compiled, TemplateError> {
    let (directive, body, first_line) = split_directive(text);
    let mode = directive.mode.unwrap_or(ctx.default_mode);
    let debug = directive.debug.unwrap_or(ctx.debug);
    if debug {
        tracing::debug!(%mode, "compiling template");
    }

    let mut compiler = Compiler {
        ctx,
        chain,
        builder: ProgramBuilder::new(),
        frames: Vec::new(),
        pending: Vec::new(),
        pending_line: None,
        debug,
    };
    for token in tokenize(body, mode, first_line) {
        compiler.feed(token)?;
    }
    let program = compiler.finish()?;

    if debug {
        tracing::debug!(instructions = program.len(), "compiled program\n{}", program);
    }
    Ok(Compiled {
        program,
        mode,
        debug,
    })
}

struct Compiler<'a, 'c> {
    ctx: &'a CompileContext<'c>,
    chain: &'a mut IncludeChain,
    builder: ProgramBuilder,
    frames: Vec<Frame>,
    pending: Vec<Fragment>,
    /// Line of the first pending fragment
    pending_line: Option<usize>,
    debug: bool,
}

fn syntax(message: impl Into<String>, tag: &Tag) -> TemplateError {
    TemplateError::syntax(message, tag.line, tag.source.clone())
}

impl<'a, 'c> Compiler<'a, 'c> {
    fn expression(&self, text: &str, tag: &Tag) -> Result<Expr, TemplateError> {
        compile_expression(text, self.ctx.filters)
            .map_err(|ParseError(message)| syntax(message, tag))
    }

    fn flush(&mut self) {
        let op = match self.pending.len() {
            0 => return,
            1 => match self.pending.pop() {
                Some(fragment) => Op::Append(fragment),
                None => return,
            },
            _ => Op::Extend(std::mem::take(&mut self.pending)),
        };
        let line = self.pending_line.take().unwrap_or_default();
        self.builder.push(op, line, "");
    }

    /// Emit a control instruction after flushing pending output
    fn emit(&mut self, op: Op, tag: &Tag) {
        self.flush();
        self.builder.push(op, tag.line, tag.source.clone());
    }

    fn open(&mut self, block: Block, tag: &Tag) {
        self.frames.push(Frame {
            block,
            line: tag.line,
            source: tag.source.clone(),
        });
    }

    fn feed(&mut self, token: Token) -> Result<(), TemplateError> {
        if self.debug {
            tracing::debug!(line = token.line(), ?token, "token");
        }

        let verbatim = self.frames.last().and_then(|frame| match frame.block {
            Block::Raw { .. } | Block::Comment { .. } => Some(frame.block.kind()),
            _ => None,
        });
        if let Some(kind) = verbatim {
            let chunk = match token {
                Token::Tag(tag) if is_end_of(&tag, kind) => {
                    self.close_verbatim(tag.line);
                    return Ok(());
                }
                Token::Tag(tag) => tag.source,
                Token::Literal { text, .. } => text,
            };
            if let Some(Frame {
                block: Block::Raw { text } | Block::Comment { text, .. },
                ..
            }) = self.frames.last_mut()
            {
                text.push_str(&chunk);
            }
            return Ok(());
        }

        match token {
            Token::Literal { text, line } => {
                self.pending_line.get_or_insert(line);
                self.pending.push(Fragment::Literal(text));
                Ok(())
            }
            Token::Tag(tag) => {
                let op = classify(&tag)?;
                self.apply(op, &tag)
            }
        }
    }

    fn close_verbatim(&mut self, line: usize) {
        let text = match self.frames.pop().map(|frame| frame.block) {
            Some(Block::Raw { text }) => text,
            Some(Block::Comment { sign, text }) => prefix_lines(&text, &sign),
            _ => return,
        };
        if !text.is_empty() {
            self.pending_line.get_or_insert(line);
            self.pending.push(Fragment::Literal(text));
        }
    }

    fn apply(&mut self, op: TagOp, tag: &Tag) -> Result<(), TemplateError> {
        match op {
            TagOp::Output(text) => {
                let expr = self.expression(&text, tag)?;
                self.pending_line.get_or_insert(tag.line);
                self.pending.push(Fragment::Expr {
                    expr,
                    line: tag.line,
                    source: tag.source.clone(),
                });
            }
            TagOp::Note => self.flush(),
            TagOp::If(cond) => {
                let cond = self.expression(&cond, tag)?;
                self.emit(Op::If(cond), tag);
                self.open(Block::If { has_else: false }, tag);
                self.builder.indent();
            }
            TagOp::Unless(cond) => {
                let cond = self.expression(&cond, tag)?;
                self.emit(Op::If(Expr::not(cond)), tag);
                self.open(Block::Unless { has_else: false }, tag);
                self.builder.indent();
            }
            TagOp::For(header) => {
                let (targets, iterable) = parse_loop_header(&header, self.ctx.filters)
                    .map_err(|ParseError(message)| syntax(message, tag))?;
                self.emit(Op::For { targets, iterable }, tag);
                self.open(Block::For, tag);
                self.builder.indent();
            }
            TagOp::While(cond) => {
                let cond = self.expression(&cond, tag)?;
                self.emit(Op::While(cond), tag);
                self.open(Block::While, tag);
                self.builder.indent();
            }
            TagOp::Elif(cond) => self.elif(&cond, tag)?,
            TagOp::Else => self.else_branch(tag)?,
            TagOp::Case(subject) => {
                let subject = self.expression(&subject, tag)?;
                self.flush();
                self.open(
                    Block::Case {
                        subject,
                        seen_when: false,
                        has_else: false,
                    },
                    tag,
                );
            }
            TagOp::When(values) => self.when(&values, tag)?,
            TagOp::Capture(name) => {
                self.emit(Op::CaptureStart(name.clone()), tag);
                self.open(Block::Capture { name }, tag);
                self.builder.indent();
            }
            TagOp::Raw => self.open(Block::Raw { text: String::new() }, tag),
            TagOp::Comment { sign } => self.open(
                Block::Comment {
                    sign,
                    text: String::new(),
                },
                tag,
            ),
            TagOp::Paginate(_) => self.open(Block::Paginate, tag),
            TagOp::End(kind) => self.end(kind, tag)?,
            TagOp::Break => self.loop_control(Op::Break, "break", tag)?,
            TagOp::Continue => self.loop_control(Op::Continue, "continue", tag)?,
            TagOp::Assign { name, value } => {
                let value = self.expression(&value, tag)?;
                self.emit(Op::Assign { name, value }, tag);
            }
            TagOp::Increment(name) => self.emit(Op::Increment(name), tag),
            TagOp::Decrement(name) => self.emit(Op::Decrement(name), tag),
            TagOp::Include(argument) => self.include(&argument, tag)?,
            TagOp::Python(statement) => {
                let op = match split_once(&statement, '=') {
                    Some((name, value))
                        if is_identifier(name) && !value.is_empty() && !value.starts_with('=') =>
                    {
                        Op::Assign {
                            name: name.to_string(),
                            value: self.expression(value, tag)?,
                        }
                    }
                    _ => Op::Exec(self.expression(&statement, tag)?),
                };
                self.emit(op, tag);
            }
        }
        Ok(())
    }

    fn loop_control(&mut self, op: Op, keyword: &str, tag: &Tag) -> Result<(), TemplateError> {
        let in_loop = self
            .frames
            .iter()
            .any(|frame| matches!(frame.block, Block::For | Block::While));
        if !in_loop {
            return Err(syntax(format!("'{}' outside of a loop", keyword), tag));
        }
        self.emit(op, tag);
        Ok(())
    }

    fn elif(&mut self, cond: &str, tag: &Tag) -> Result<(), TemplateError> {
        match self.frames.last().map(|frame| &frame.block) {
            Some(Block::If { has_else: false } | Block::Unless { has_else: false }) => {}
            Some(Block::If { .. } | Block::Unless { .. }) => {
                return Err(syntax("'elif' after 'else'", tag));
            }
            _ => return Err(syntax("'elif' without matching 'if'", tag)),
        }
        let cond = self.expression(cond, tag)?;
        self.flush();
        self.builder.dedent();
        self.emit(Op::Elif(cond), tag);
        self.builder.indent();
        Ok(())
    }

    fn else_branch(&mut self, tag: &Tag) -> Result<(), TemplateError> {
        let has_else = match self.frames.last_mut().map(|frame| &mut frame.block) {
            Some(Block::If { has_else } | Block::Unless { has_else }) => has_else,
            Some(Block::Case {
                seen_when: false, ..
            }) => return Err(syntax("'else' before any 'when'", tag)),
            Some(Block::Case { has_else, .. }) => has_else,
            _ => return Err(syntax("'else' without matching 'if' or 'case'", tag)),
        };
        if *has_else {
            return Err(syntax("Duplicate 'else'", tag));
        }
        *has_else = true;

        self.flush();
        self.builder.dedent();
        self.emit(Op::Else, tag);
        self.builder.indent();
        Ok(())
    }

    fn when(&mut self, values: &str, tag: &Tag) -> Result<(), TemplateError> {
        let subject = match self.frames.last().map(|frame| &frame.block) {
            Some(Block::Case { has_else: true, .. }) => {
                return Err(syntax("'when' after 'else'", tag));
            }
            Some(Block::Case { subject, .. }) => subject.clone(),
            _ => return Err(syntax("'when' without matching 'case'", tag)),
        };

        let mut cond: Option<Expr> = None;
        for value in split(values, ',') {
            let test = Expr::binary(BinaryOp::Eq, subject.clone(), self.expression(&value, tag)?);
            cond = Some(match cond {
                Some(prev) => Expr::binary(BinaryOp::Or, prev, test),
                None => test,
            });
        }
        let cond = cond.ok_or_else(|| syntax("'when' requires a value", tag))?;

        let first = match self.frames.last_mut().map(|frame| &mut frame.block) {
            Some(Block::Case { seen_when, .. }) => !std::mem::replace(seen_when, true),
            _ => false,
        };
        if first {
            self.emit(Op::If(cond), tag);
        } else {
            self.flush();
            self.builder.dedent();
            self.emit(Op::Elif(cond), tag);
        }
        self.builder.indent();
        Ok(())
    }

    fn end(&mut self, kind: BlockKind, tag: &Tag) -> Result<(), TemplateError> {
        match self.frames.last().map(|frame| frame.block.kind()) {
            Some(open) if open == kind => {}
            Some(open) => {
                return Err(syntax(
                    format!("Unmatched tag: end{}/end{}", open, kind),
                    tag,
                ))
            }
            None => return Err(syntax(format!("Unmatched tag: end{}", kind), tag)),
        }

        match self.frames.pop().map(|frame| frame.block) {
            Some(Block::If { .. } | Block::Unless { .. } | Block::For | Block::While)
            | Some(Block::Case {
                seen_when: true, ..
            }) => {
                self.flush();
                self.builder.dedent();
                self.emit(Op::EndBlock, tag);
            }
            Some(Block::Capture { name }) => {
                self.flush();
                self.builder.dedent();
                self.emit(Op::CaptureEnd(name), tag);
            }
            _ => {}
        }
        Ok(())
    }

    fn include(&mut self, argument: &str, tag: &Tag) -> Result<(), TemplateError> {
        let request = parse_include(argument).map_err(|message| syntax(message, tag))?;
        let path = resolve_path(
            self.ctx.include_dir,
            &request.path,
            self.ctx.include_extension,
        );

        self.chain
            .enter(&path, self.ctx.max_include_depth)
            .map_err(|message| syntax(message, tag))?;
        let child = self.compile_include(&path, tag);
        self.chain.leave();
        let child = child?;

        if let Some((name, value)) = request.param {
            let value = self.expression(&value, tag)?;
            self.emit(Op::Assign { name, value }, tag);
        } else {
            self.flush();
        }
        self.builder.splice(child.program);
        Ok(())
    }

    fn compile_include(&mut self, path: &Path, tag: &Tag) -> Result<Compiled, TemplateError> {
        let text = self
            .ctx
            .loader
            .load(path)
            .map_err(|e| syntax(format!("Cannot include '{}': {}", path.display(), e), tag))?;
        if self.debug {
            tracing::debug!(path = %path.display(), "including template");
        }

        compile_program(&text, self.ctx, self.chain).map_err(|e| match e {
            TemplateError::Syntax {
                message,
                line,
                text,
            } => TemplateError::Syntax {
                message: format!("In included file {}: {}", path.display(), message),
                line,
                text,
            },
            other => other,
        })
    }

    fn finish(mut self) -> Result<Program, TemplateError> {
        if let Some(frame) = self.frames.last() {
            return Err(TemplateError::syntax(
                format!("Unclosed template tag: {}", frame.block.kind()),
                frame.line,
                frame.source.clone(),
            ));
        }
        self.flush();
        Ok(self.builder.finish())
    }
}

/// Compile `text` with a fresh include chain
pub(crate) fn compile_root(
    text: &str,
    ctx: &CompileContext<'_>,
) -> Result<Compiled, TemplateError> {
    compile_program(text, ctx, &mut IncludeChain::default())
}
