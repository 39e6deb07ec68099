//! Osprey RT — the emulator's concurrency engine.
//!
//! Provides the tick-synchronized global clock, the blocking ready queue,
//! per-core CPU workers, the contiguous memory manager that gates
//! admission, the per-process instruction evaluator, and the scheduler
//! façade that ties their lifecycles together.

pub mod clock;
pub mod evaluator;
pub mod generator;
pub mod memory;
pub mod process;
pub mod queue;
pub mod scheduler;
pub mod worker;
