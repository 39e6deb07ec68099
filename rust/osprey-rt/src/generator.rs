//! Random program generation for batch-created processes.
//!
//! Programs are drawn from the small instruction set the emulator's
//! processes use, all threaded through a single working variable `x`:
//! declarations that re-seed `x`, `"Value from: " + x` prints, saturating
//! arithmetic on `x`, sleeps, and bounded `FOR` loops with a capped
//! nesting depth. Loop bodies stay short so a single instruction never
//! dominates a tick.

use osprey_core::atom::Atom;
use osprey_core::instruction::Instruction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum `FOR` nesting depth in generated programs.
const MAX_FOR_DEPTH: u32 = 3;

/// Random instruction-program generator.
pub struct InstructionGenerator {
    rng: StdRng,
}

impl Default for InstructionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionGenerator {
    /// Generator seeded from the OS entropy source.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a program with a uniformly random top-level instruction
    /// count in `[min_instructions, max_instructions]`.
    pub fn random_program(&mut self, min_instructions: u32, max_instructions: u32) -> Vec<Instruction> {
        let min = min_instructions.max(1);
        let max = max_instructions.max(min);
        let count = self.rng.gen_range(min..=max);
        (0..count).map(|_| self.instruction(MAX_FOR_DEPTH)).collect()
    }

    fn instruction(&mut self, depth: u32) -> Instruction {
        match self.rng.gen_range(0..6) {
            0 => self.declare(),
            1 => self.print_value(),
            2 => self.add(),
            3 => self.sub(),
            4 => self.sleep(),
            _ if depth > 0 => self.for_loop(depth - 1),
            // At the depth limit, fall back to a print.
            _ => self.print_value(),
        }
    }

    /// Re-seed `x` so later prints and arithmetic read a declared value.
    fn declare(&mut self) -> Instruction {
        let value = self.rng.gen_range(1..=1000u16);
        Instruction::Declare("x".into(), Atom::Number(value))
    }

    fn print_value(&mut self) -> Instruction {
        Instruction::PrintConcat(Atom::str("Value from: "), Atom::name("x"))
    }

    fn add(&mut self) -> Instruction {
        let value = self.rng.gen_range(1..=10u16);
        Instruction::Add("x".into(), Atom::name("x"), Atom::Number(value))
    }

    fn sub(&mut self) -> Instruction {
        let value = self.rng.gen_range(1..=10u16);
        Instruction::Sub("x".into(), Atom::name("x"), Atom::Number(value))
    }

    fn sleep(&mut self) -> Instruction {
        let cycles = self.rng.gen_range(1..=10u16);
        Instruction::Sleep(Atom::Number(cycles))
    }

    fn for_loop(&mut self, depth: u32) -> Instruction {
        let body_len = self.rng.gen_range(1..=3);
        let body = (0..body_len).map(|_| self.instruction(depth)).collect();
        let count = self.rng.gen_range(1..=5u16);
        Instruction::For(body, Atom::Number(count))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
