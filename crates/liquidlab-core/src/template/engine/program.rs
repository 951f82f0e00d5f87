//! Intermediate program
//!
//! The compiler emits a flat list of [`Instruction`]s. Control flow is
//! structural: every `if`/`for`/`while` opener is closed by an
//! [`Op::EndBlock`] at the same depth. [`ProgramBuilder::finish`] resolves
//! that structure once into a jump table so the renderer never searches.

use std::fmt;

use crate::template::expr::Expr;

/// Output piece of an append instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Literal(String),
    /// `{{ expr }}` with its own provenance, since one instruction may batch
    /// fragments from several lines
    Expr {
        expr: Expr,
        line: usize,
        source: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Append(Fragment),
    Extend(Vec<Fragment>),
    If(Expr),
    Elif(Expr),
    Else,
    For { targets: Vec<String>, iterable: Expr },
    While(Expr),
    EndBlock,
    Break,
    Continue,
    Assign { name: String, value: Expr },
    Increment(String),
    Decrement(String),
    CaptureStart(String),
    CaptureEnd(String),
    /// Expression evaluated for its side effects
    Exec(Expr),
}

impl Op {
    /// True for instructions closed by an [`Op::EndBlock`]
    pub fn opens_block(&self) -> bool {
        matches!(self, Op::If(_) | Op::For { .. } | Op::While(_))
    }

    fn is_loop(&self) -> bool {
        matches!(self, Op::For { .. } | Op::While(_))
    }
}

fn write_fragment(f: &mut fmt::Formatter<'_>, fragment: &Fragment) -> fmt::Result {
    match fragment {
        Fragment::Literal(text) => write!(f, "{:?}", text),
        Fragment::Expr { expr, .. } => write!(f, "{{{{ {} }}}}", expr),
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Append(fragment) => {
                f.write_str("append ")?;
                write_fragment(f, fragment)
            }
            Op::Extend(fragments) => {
                f.write_str("extend [")?;
                for (i, fragment) in fragments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_fragment(f, fragment)?;
                }
                f.write_str("]")
            }
            Op::If(cond) => write!(f, "if {}", cond),
            Op::Elif(cond) => write!(f, "elif {}", cond),
            Op::Else => f.write_str("else"),
            Op::For { targets, iterable } => write!(f, "for {} in {}", targets.join(", "), iterable),
            Op::While(cond) => write!(f, "while {}", cond),
            Op::EndBlock => f.write_str("end"),
            Op::Break => f.write_str("break"),
            Op::Continue => f.write_str("continue"),
            Op::Assign { name, value } => write!(f, "{} = {}", name, value),
            Op::Increment(name) => write!(f, "{} += 1", name),
            Op::Decrement(name) => write!(f, "{} -= 1", name),
            Op::CaptureStart(name) => write!(f, "capture {}", name),
            Op::CaptureEnd(name) => write!(f, "endcapture {}", name),
            Op::Exec(expr) => write!(f, "exec {}", expr),
        }
    }
}

/// One executable step with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    /// Number of enclosing control regions
    pub depth: usize,
    pub line: usize,
    pub source: String,
}

/// A compiled, linked instruction sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// Jump targets:
    /// - branch (`if`/`elif`/`else`) -> next branch or its `end`
    /// - loop opener -> its `end`
    /// - `end` -> its opener
    /// - `break`/`continue` -> innermost loop opener
    /// - capture start <-> capture end
    links: Vec<Option<usize>>,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub(crate) fn link(&self, index: usize) -> Option<usize> {
        self.links.get(index).copied().flatten()
    }

    pub(crate) fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Listing of the instructions around `index`, marked with `*`
    pub(crate) fn window(&self, index: usize, before: usize, after: usize) -> String {
        let start = index.saturating_sub(before);
        let end = (index + after + 1).min(self.instructions.len());
        (start..end)
            .map(|i| {
                let marker = if i == index { '*' } else { ' ' };
                format!("{} {}", marker, ListingLine(&self.instructions[i]))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct ListingLine<'a>(&'a Instruction);

impl fmt::Display for ListingLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inst = self.0;
        write!(
            f,
            "{:>4} | {}{}",
            inst.line,
            "    ".repeat(inst.depth),
            inst.op
        )
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inst in &self.instructions {
            writeln!(f, "{}", ListingLine(inst))?;
        }
        Ok(())
    }
}

/// Accumulates instructions while tracking the current depth
#[derive(Debug, Default)]
pub(crate) struct ProgramBuilder {
    instructions: Vec<Instruction>,
    depth: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op, line: usize, source: impl Into<String>) {
        self.instructions.push(Instruction {
            op,
            depth: self.depth,
            line,
            source: source.into(),
        });
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Append another program's instructions at the current depth
    pub fn splice(&mut self, program: Program) {
        let offset = self.depth;
        self.instructions
            .extend(program.into_instructions().into_iter().map(|mut inst| {
                inst.depth += offset;
                inst
            }));
    }

    pub fn finish(self) -> Program {
        let links = link(&self.instructions);
        Program {
            instructions: self.instructions,
            links,
        }
    }
}

/// An open control region during linking
struct OpenBlock {
    opener: usize,
    last_branch: usize,
}

fn link(instructions: &[Instruction]) -> Vec<Option<usize>> {
    let mut links = vec![None; instructions.len()];
    let mut blocks: Vec<OpenBlock> = Vec::new();
    let mut captures: Vec<usize> = Vec::new();

    for (i, inst) in instructions.iter().enumerate() {
        match &inst.op {
            op if op.opens_block() => blocks.push(OpenBlock {
                opener: i,
                last_branch: i,
            }),
            Op::Elif(_) | Op::Else => {
                if let Some(block) = blocks.last_mut() {
                    links[block.last_branch] = Some(i);
                    block.last_branch = i;
                }
            }
            Op::EndBlock => {
                if let Some(block) = blocks.pop() {
                    links[block.last_branch] = Some(i);
                    links[i] = Some(block.opener);
                }
            }
            Op::Break | Op::Continue => {
                links[i] = blocks
                    .iter()
                    .rev()
                    .find(|block| instructions[block.opener].op.is_loop())
                    .map(|block| block.opener);
            }
            Op::CaptureStart(_) => captures.push(i),
            Op::CaptureEnd(_) => {
                if let Some(start) = captures.pop() {
                    links[start] = Some(i);
                    links[i] = Some(start);
                }
            }
            _ => {}
        }
    }

    links
}
