//! Program interpreter
//!
//! Walks the linked program with a program counter. Loops keep their
//! remaining items on a loop stack; captures keep their output on a capture
//! stack so nested captures and early `break`s unwind cleanly.

use std::sync::Arc;

use crate::config::consts::render::{CONTEXT_AFTER, CONTEXT_BEFORE, MISSING_DATA_HINT};
use crate::template::error::{EvalError, TemplateError};
use crate::template::expr::{eval, Expr, Scope};
use crate::template::filters::FilterRegistry;
use crate::template::value::{Bindings, Value};

use super::program::{Fragment, Op, Program};

/// An active `for` or `while` loop
struct LoopFrame {
    opener: usize,
    /// Remaining items; `None` for `while`
    items: Option<std::vec::IntoIter<Value>>,
    /// Capture stack height when the loop was entered
    captures: usize,
}

/// A fault with the provenance it should be reported at
struct Fault {
    error: EvalError,
    line: usize,
    source: String,
}

struct Machine<'p> {
    program: &'p Program,
    env: Bindings,
    filters: &'p Arc<FilterRegistry>,
    output: String,
    captures: Vec<String>,
    loops: Vec<LoopFrame>,
}

/// Execute `program` against `env`, returning the output and final bindings
pub(crate) fn execute(
    program: &Program,
    env: Bindings,
    filters: &Arc<FilterRegistry>,
) -> Result<(String, Bindings), TemplateError> {
    let mut machine = Machine {
        program,
        env,
        filters,
        output: String::new(),
        captures: Vec::new(),
        loops: Vec::new(),
    };

    let mut pc = 0;
    while pc < program.len() {
        pc = machine.step(pc).map_err(|fault| machine.report(pc, fault))?;
    }
    Ok((machine.output, machine.env))
}

impl<'p> Machine<'p> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        eval(expr, &Scope::new(&self.env, self.filters))
    }

    fn write(&mut self, text: &str) {
        match self.captures.last_mut() {
            Some(buffer) => buffer.push_str(text),
            None => self.output.push_str(text),
        }
    }

    fn emit(&mut self, fragment: &Fragment) -> Result<(), Fault> {
        match fragment {
            Fragment::Literal(text) => self.write(text),
            Fragment::Expr { expr, line, source } => {
                let value = self.eval(expr).map_err(|error| Fault {
                    error,
                    line: *line,
                    source: source.clone(),
                })?;
                self.write(&value.render());
            }
        }
        Ok(())
    }

    fn link(&self, index: usize) -> usize {
        self.program.link(index).unwrap_or(self.program.len())
    }

    /// `end` of the branch chain containing the branch at `index`
    fn chain_end(&self, mut index: usize) -> usize {
        while !matches!(
            self.program.instructions().get(index).map(|inst| &inst.op),
            Some(Op::EndBlock) | None
        ) {
            index = self.link(index);
        }
        index
    }

    fn bind_targets(&mut self, targets: &[String], item: Value) -> Result<(), EvalError> {
        if let [target] = targets {
            self.env.insert(target.clone(), item);
            return Ok(());
        }
        match item {
            Value::List(values) if values.len() == targets.len() => {
                for (target, value) in targets.iter().zip(values) {
                    self.env.insert(target.clone(), value);
                }
                Ok(())
            }
            other => Err(EvalError::type_error(format!(
                "cannot unpack {} into {} loop variables",
                other.type_name(),
                targets.len()
            ))),
        }
    }

    /// Leave loops down to and including the one opened at `opener`
    fn unwind_to(&mut self, opener: usize, keep_frame: bool) {
        while let Some(frame) = self.loops.last() {
            let found = frame.opener == opener;
            self.captures.truncate(frame.captures);
            if found && keep_frame {
                return;
            }
            self.loops.pop();
            if found {
                return;
            }
        }
    }

    fn step_counter(&mut self, name: &str, delta: i64) -> Result<(), EvalError> {
        let current = self
            .env
            .get(name)
            .ok_or_else(|| EvalError::UndefinedName(name.to_string()))?;
        let next = current.add(&Value::Int(delta))?;
        self.env.insert(name.to_string(), next);
        Ok(())
    }

    fn step(&mut self, pc: usize) -> Result<usize, Fault> {
        let program = self.program;
        let inst = &program.instructions()[pc];
        let fault = |error: EvalError| Fault {
            error,
            line: inst.line,
            source: inst.source.clone(),
        };

        match &inst.op {
            Op::Append(fragment) => self.emit(fragment)?,
            Op::Extend(fragments) => {
                for fragment in fragments {
                    self.emit(fragment)?;
                }
            }
            Op::If(cond) => {
                if self.eval(cond).map_err(fault)?.is_truthy() {
                    return Ok(pc + 1);
                }
                return self.next_branch(pc);
            }
            // Reached by falling out of a taken branch
            Op::Elif(_) | Op::Else => return Ok(self.chain_end(pc) + 1),
            Op::For { targets, iterable } => {
                let reentry = self.loops.last().is_some_and(|frame| frame.opener == pc);
                if !reentry {
                    let items = self.eval(iterable).map_err(fault)?.iterate().map_err(fault)?;
                    self.loops.push(LoopFrame {
                        opener: pc,
                        items: Some(items.into_iter()),
                        captures: self.captures.len(),
                    });
                }
                let next = self
                    .loops
                    .last_mut()
                    .and_then(|frame| frame.items.as_mut())
                    .and_then(|items| items.next());
                match next {
                    Some(item) => self.bind_targets(targets, item).map_err(fault)?,
                    None => {
                        self.loops.pop();
                        return Ok(self.link(pc) + 1);
                    }
                }
            }
            Op::While(cond) => {
                let reentry = self.loops.last().is_some_and(|frame| frame.opener == pc);
                if !reentry {
                    self.loops.push(LoopFrame {
                        opener: pc,
                        items: None,
                        captures: self.captures.len(),
                    });
                }
                if !self.eval(cond).map_err(fault)?.is_truthy() {
                    self.loops.pop();
                    return Ok(self.link(pc) + 1);
                }
            }
            Op::EndBlock => {
                let opener = self.link(pc);
                let is_loop = program
                    .instructions()
                    .get(opener)
                    .is_some_and(|inst| matches!(inst.op, Op::For { .. } | Op::While(_)));
                if is_loop {
                    return Ok(opener);
                }
            }
            Op::Break => {
                let opener = self.link(pc);
                self.unwind_to(opener, false);
                return Ok(self.link(opener) + 1);
            }
            Op::Continue => {
                let opener = self.link(pc);
                self.unwind_to(opener, true);
                return Ok(opener);
            }
            Op::Assign { name, value } => {
                let value = self.eval(value).map_err(fault)?;
                self.env.insert(name.clone(), value);
            }
            Op::Increment(name) => self.step_counter(name, 1).map_err(fault)?,
            Op::Decrement(name) => self.step_counter(name, -1).map_err(fault)?,
            Op::CaptureStart(_) => self.captures.push(String::new()),
            Op::CaptureEnd(name) => {
                let captured = self.captures.pop().unwrap_or_default();
                self.env.insert(name.clone(), Value::Str(captured));
            }
            Op::Exec(expr) => {
                self.eval(expr).map_err(fault)?;
            }
        }
        Ok(pc + 1)
    }

    /// Pick the branch to run after the `if` at `pc` failed
    fn next_branch(&mut self, pc: usize) -> Result<usize, Fault> {
        let program = self.program;
        let mut branch = self.link(pc);
        loop {
            let Some(inst) = program.instructions().get(branch) else {
                return Ok(branch);
            };
            match &inst.op {
                Op::Elif(cond) => {
                    let value = self.eval(cond).map_err(|error| Fault {
                        error,
                        line: inst.line,
                        source: inst.source.clone(),
                    })?;
                    if value.is_truthy() {
                        return Ok(branch + 1);
                    }
                    branch = self.link(branch);
                }
                _ => return Ok(branch + 1),
            }
        }
    }

    fn report(&self, pc: usize, fault: Fault) -> TemplateError {
        let message = match &fault.error {
            EvalError::UndefinedName(_) => format!("{}. {}", fault.error, MISSING_DATA_HINT),
            other => other.to_string(),
        };
        tracing::debug!(line = fault.line, %message, "render fault");
        TemplateError::Render {
            message,
            line: fault.line,
            text: fault.source,
            context: self.program.window(pc, CONTEXT_BEFORE, CONTEXT_AFTER),
        }
    }
}
