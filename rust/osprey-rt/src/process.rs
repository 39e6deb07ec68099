//! Process control blocks.
//!
//! A [`Pcb`] is observed concurrently by the registry, the ready queue, the
//! running/finished lists, and whichever worker is currently bursting it,
//! so it is handed around as `Arc<Pcb>` with interior mutability: atomics
//! for the per-tick counters and small mutexes for the cold fields and the
//! evaluator state.
//!
//! The scheduler guarantees that at most one worker calls [`step`](Pcb::step)
//! at a time, and at most once per tick. Everything else (status lines,
//! screen views) only reads.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use osprey_core::instruction::{ticks_budget, Instruction};

use crate::evaluator::{Evaluator, StepEffect, TIMESTAMP_FORMAT};

/// Monotonically increasing counter used to mint unique process ids.
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// The per-process state record.
pub struct Pcb {
    pid: u32,
    name: String,
    instructions: Vec<Instruction>,
    /// Total ticks this process consumes: one per instruction plus the
    /// literal argument of every top-level `SLEEP`.
    total_ticks: u64,
    /// Ticks consumed so far. Runs from 0 to `total_ticks`.
    cursor: AtomicU64,
    /// Index of the next instruction to execute. Trails `cursor` while
    /// sleep ticks are being burned down.
    pc: AtomicUsize,
    /// When non-zero, the next ticks decrement this instead of executing.
    sleep_remaining: AtomicU16,
    assigned_core: Mutex<Option<u32>>,
    created_at: DateTime<Local>,
    finished_at: Mutex<Option<DateTime<Local>>>,
    state: Mutex<Evaluator>,
}

impl Pcb {
    /// Create a PCB for `name` running `instructions`, assigning the next
    /// unique pid.
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let total_ticks = ticks_budget(&instructions);
        Self {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            instructions,
            total_ticks,
            cursor: AtomicU64::new(0),
            pc: AtomicUsize::new(0),
            sleep_remaining: AtomicU16::new(0),
            assigned_core: Mutex::new(None),
            created_at: Local::now(),
            finished_at: Mutex::new(None),
            state: Mutex::new(Evaluator::new()),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticks consumed so far.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// The full tick budget.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ticks still to be consumed before completion.
    pub fn remaining_ticks(&self) -> u64 {
        self.total_ticks.saturating_sub(self.cursor())
    }

    pub fn sleep_remaining(&self) -> u16 {
        self.sleep_remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor() >= self.total_ticks
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        *self.finished_at.lock().unwrap()
    }

    /// Record the completion timestamp. Idempotent; the first timestamp
    /// wins.
    pub fn mark_finished(&self) {
        let mut finished = self.finished_at.lock().unwrap();
        if finished.is_none() {
            *finished = Some(Local::now());
        }
    }

    pub fn assigned_core(&self) -> Option<u32> {
        *self.assigned_core.lock().unwrap()
    }

    pub fn set_assigned_core(&self, core: Option<u32>) {
        *self.assigned_core.lock().unwrap() = core;
    }

    /// Consume one tick.
    ///
    /// Sleeping burns a sleep cycle; otherwise the next instruction runs
    /// and, if it was a top-level `SLEEP`, arms `sleep_remaining` for the
    /// following ticks. An instruction that fails to evaluate is abandoned
    /// but still costs its tick; the budget stays exact. Once the program
    /// is exhausted, remaining budget (if any) drains as no-op ticks so the
    /// process always terminates.
    pub fn step(&self) {
        if self.sleep_remaining.load(Ordering::Acquire) > 0 {
            self.sleep_remaining.fetch_sub(1, Ordering::AcqRel);
            self.cursor.fetch_add(1, Ordering::AcqRel);
            return;
        }

        let pc = self.pc.load(Ordering::Acquire);
        if pc < self.instructions.len() {
            let core = self.assigned_core().unwrap_or(0);
            let effect = {
                let mut state = self.state.lock().unwrap();
                state.execute(&self.instructions[pc], core)
            };
            self.pc.store(pc + 1, Ordering::Release);
            let cursor = self.cursor.fetch_add(1, Ordering::AcqRel) + 1;

            if let Ok(StepEffect::Sleep(cycles)) = effect {
                // Never sleep past the budget; the budget only pre-counts
                // literal top-level sleeps, so variable sleep arguments
                // are clamped to the remaining headroom.
                let headroom = self.total_ticks.saturating_sub(cursor);
                let capped = headroom.min(u64::from(u16::MAX)) as u16;
                self.sleep_remaining
                    .store(cycles.min(capped), Ordering::Release);
            }
        } else if self.cursor() < self.total_ticks {
            self.cursor.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Current value of a variable, if defined.
    pub fn variable(&self, name: &str) -> Option<u16> {
        self.state.lock().unwrap().variable(name)
    }

    /// Snapshot of the print log, oldest first.
    pub fn log_lines(&self) -> Vec<String> {
        self.state.lock().unwrap().log().to_vec()
    }

    /// Write the print log to `<dir>/<name>.txt`, one line per print.
    pub fn write_log(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(format!("{}.txt", self.name));
        let mut file = fs::File::create(&path)?;
        for line in self.log_lines() {
            writeln!(file, "{}", line)?;
        }
        Ok(path)
    }

    /// Render the one-line status used by `screen -ls` and the CPU report.
    pub fn status(&self) -> String {
        let created = self.created_at.format(TIMESTAMP_FORMAT);
        let header = format!("PID:{} {} ({})  ", self.pid, self.name, created);

        if self.is_complete() {
            format!(
                "{}Finished           {} / {}",
                header, self.total_ticks, self.total_ticks
            )
        } else if let Some(core) = self.assigned_core() {
            format!(
                "{}Core: {}            {} / {}",
                header,
                core,
                self.cursor(),
                self.total_ticks
            )
        } else {
            format!(
                "{}Ready (in queue)   {} / {}",
                header,
                self.cursor(),
                self.total_ticks
            )
        }
    }
}

impl std::fmt::Debug for Pcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pcb")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("cursor", &self.cursor())
            .field("total_ticks", &self.total_ticks)
            .field("sleep_remaining", &self.sleep_remaining())
            .field("assigned_core", &self.assigned_core())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_core::atom::Atom;

    #[test]
    fn pids_are_unique_and_increasing() {
        let a = Pcb::new("a", vec![]);
        let b = Pcb::new("b", vec![]);
        assert!(b.pid() > a.pid());
    }

    #[test]
    fn empty_program_is_immediately_complete() {
        let pcb = Pcb::new("empty", vec![]);
        assert_eq!(pcb.total_ticks(), 0);
        assert!(pcb.is_complete());
    }

    #[test]
    fn sleep_budget_trace_matches_tick_for_tick() {
        // [SLEEP(3), PRINT("hi")]: budget 2 + 3 = 5.
        let pcb = Pcb::new(
            "sleeper",
            vec![
                Instruction::Sleep(Atom::Number(3)),
                Instruction::Print(Atom::str("hi")),
            ],
        );
        assert_eq!(pcb.total_ticks(), 5);

        pcb.step(); // schedules the sleep
        assert_eq!(pcb.cursor(), 1);
        assert_eq!(pcb.sleep_remaining(), 3);

        pcb.step();
        pcb.step();
        pcb.step(); // sleep drained
        assert_eq!(pcb.cursor(), 4);
        assert_eq!(pcb.sleep_remaining(), 0);
        assert!(pcb.log_lines().is_empty());

        pcb.step(); // the print
        assert_eq!(pcb.cursor(), 5);
        assert!(pcb.is_complete());
        assert_eq!(pcb.log_lines().len(), 1);
    }

    #[test]
    fn sleep_zero_costs_exactly_one_tick() {
        let pcb = Pcb::new("s0", vec![Instruction::Sleep(Atom::Number(0))]);
        assert_eq!(pcb.total_ticks(), 1);
        pcb.step();
        assert!(pcb.is_complete());
    }

    #[test]
    fn variable_sleep_is_clamped_to_the_budget() {
        // Budget is 2 (no literal sleep), but the resolved sleep wants 9.
        let pcb = Pcb::new(
            "clamped",
            vec![
                Instruction::Declare("n".into(), Atom::Number(9)),
                Instruction::Sleep(Atom::name("n")),
            ],
        );
        assert_eq!(pcb.total_ticks(), 2);
        pcb.step();
        pcb.step();
        assert_eq!(pcb.sleep_remaining(), 0);
        assert!(pcb.is_complete());
    }

    #[test]
    fn saturating_arithmetic_through_step() {
        let pcb = Pcb::new(
            "sat",
            vec![
                Instruction::Declare("x".into(), Atom::Number(65530)),
                Instruction::Add("x".into(), Atom::name("x"), Atom::Number(100)),
                Instruction::Declare("y".into(), Atom::Number(3)),
                Instruction::Sub("y".into(), Atom::name("y"), Atom::Number(10)),
            ],
        );
        while !pcb.is_complete() {
            pcb.step();
        }
        assert_eq!(pcb.variable("x"), Some(65535));
        assert_eq!(pcb.variable("y"), Some(0));
    }

    #[test]
    fn failed_instruction_still_costs_its_tick() {
        let pcb = Pcb::new(
            "bad",
            vec![
                Instruction::Declare("x".into(), Atom::str("not a number")),
                Instruction::Print(Atom::str("after")),
            ],
        );
        pcb.step();
        assert_eq!(pcb.cursor(), 1);
        assert_eq!(pcb.variable("x"), None);
        pcb.step();
        assert!(pcb.is_complete());
        assert_eq!(pcb.log_lines().len(), 1);
    }

    #[test]
    fn step_past_completion_is_a_no_op() {
        let pcb = Pcb::new("done", vec![Instruction::Print(Atom::str("x"))]);
        pcb.step();
        assert!(pcb.is_complete());
        pcb.step();
        assert_eq!(pcb.cursor(), 1);
    }

    #[test]
    fn status_reflects_lifecycle() {
        let pcb = Pcb::new("proc", vec![Instruction::Print(Atom::str("x"))]);
        assert!(pcb.status().contains("Ready (in queue)"));

        pcb.set_assigned_core(Some(2));
        assert!(pcb.status().contains("Core: 2"));

        pcb.step();
        assert!(pcb.status().contains("Finished"));
        assert!(pcb.status().contains("1 / 1"));
    }

    #[test]
    fn mark_finished_keeps_first_timestamp() {
        let pcb = Pcb::new("t", vec![]);
        pcb.mark_finished();
        let first = pcb.finished_at().unwrap();
        pcb.mark_finished();
        assert_eq!(pcb.finished_at().unwrap(), first);
    }

    #[test]
    fn write_log_produces_one_line_per_print() {
        let pcb = Pcb::new(
            "logged",
            vec![
                Instruction::Print(Atom::str("a")),
                Instruction::Print(Atom::str("b")),
            ],
        );
        while !pcb.is_complete() {
            pcb.step();
        }
        let dir = std::env::temp_dir();
        let path = pcb.write_log(&dir).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"a\""));
        assert!(contents.contains("\"b\""));
    }
}
