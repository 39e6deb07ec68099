//! Per-process instruction evaluator.
//!
//! Each PCB owns one [`Evaluator`]: a variable map plus the timestamped
//! print log. Evaluation touches nothing outside the owning process; the
//! only cross-cutting effect an instruction can have is `SLEEP`, which is
//! reported back to the caller as a [`StepEffect`] so the PCB can suspend
//! itself; the evaluator never blocks.
//!
//! Arithmetic is saturating 16-bit unsigned: `ADD` clamps at 65535 and
//! `SUBTRACT` clamps at 0. Reading an undefined variable yields 0 rather
//! than an error, so randomly generated programs always make progress.

use std::collections::HashMap;

use chrono::Local;
use osprey_core::atom::Atom;
use osprey_core::instruction::Instruction;
use thiserror::Error;

/// Timestamp layout shared by log lines and reports.
pub(crate) const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// An instruction that could not be evaluated.
///
/// The step that raised it is aborted, but the owning PCB still advances
/// its cursor; the tick budget must stay exact even for bad instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("string `{0}` has no numeric value")]
    StringOperand(String),
}

/// Side effect of evaluating one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    /// Nothing beyond variable/log updates.
    None,
    /// The instruction was a top-level `SLEEP`; the process should suspend
    /// for this many ticks.
    Sleep(u16),
}

/// Variable map and print log for a single process.
#[derive(Debug, Default)]
pub struct Evaluator {
    variables: HashMap<String, u16>,
    log: Vec<String>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric value of an atom. Undefined names read as 0; strings have
    /// no numeric value.
    pub fn resolve(&self, atom: &Atom) -> Result<u16, EvalError> {
        match atom {
            Atom::Number(n) => Ok(*n),
            Atom::Name(name) => Ok(self.variables.get(name).copied().unwrap_or(0)),
            Atom::Str(s) => Err(EvalError::StringOperand(s.clone())),
        }
    }

    /// Printable rendering of an atom: strings literally, numbers in
    /// decimal, names resolved to their decimal value (0 when undefined).
    fn render(&self, atom: &Atom) -> String {
        match atom {
            Atom::Str(s) => s.clone(),
            Atom::Number(n) => n.to_string(),
            Atom::Name(name) => self.variables.get(name).copied().unwrap_or(0).to_string(),
        }
    }

    /// Evaluate one instruction on behalf of the process running on
    /// `core`.
    ///
    /// `FOR` bodies run synchronously here, inside the caller's single
    /// tick; a `SLEEP` nested in a `FOR` has no effect, matching the rule
    /// that only top-level sleeps suspend.
    pub fn execute(&mut self, instr: &Instruction, core: u32) -> Result<StepEffect, EvalError> {
        match instr {
            Instruction::Declare(name, value) => {
                let value = self.resolve(value)?;
                self.variables.insert(name.clone(), value);
            }
            Instruction::Print(arg) => {
                let text = self.render(arg);
                self.push_log_line(&text, core);
            }
            Instruction::PrintConcat(lhs, rhs) => {
                let text = format!("{}{}", self.render(lhs), self.render(rhs));
                self.push_log_line(&text, core);
            }
            Instruction::Add(dest, lhs, rhs) => {
                let value = self.resolve(lhs)?.saturating_add(self.resolve(rhs)?);
                self.variables.insert(dest.clone(), value);
            }
            Instruction::Sub(dest, lhs, rhs) => {
                let value = self.resolve(lhs)?.saturating_sub(self.resolve(rhs)?);
                self.variables.insert(dest.clone(), value);
            }
            Instruction::Sleep(cycles) => {
                return Ok(StepEffect::Sleep(self.resolve(cycles)?));
            }
            Instruction::For(body, count) => {
                let iterations = self.resolve(count)?;
                for _ in 0..iterations {
                    for inner in body {
                        self.execute(inner, core)?;
                    }
                }
            }
        }
        Ok(StepEffect::None)
    }

    fn push_log_line(&mut self, text: &str, core: u32) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        self.log.push(format!("({}) \"{}\" Core:{}", timestamp, text, core));
    }

    /// Current value of a variable, if defined.
    pub fn variable(&self, name: &str) -> Option<u16> {
        self.variables.get(name).copied()
    }

    /// The print log, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
