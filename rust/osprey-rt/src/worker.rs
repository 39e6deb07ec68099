//! Per-core CPU workers.
//!
//! Each worker owns a dedicated OS thread and executes one process burst at
//! a time. The dispatcher hands it a PCB plus a quantum via
//! [`assign`](CpuWorker::assign); the worker then steps the process once
//! per global tick (subject to the execution-delay gate) until the quantum
//! is spent, the process completes, or shutdown is requested.
//!
//! A worker never picks work for itself; idle workers sleep on their own
//! condition variable until the dispatcher wakes them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::clock::GlobalClock;
use crate::memory::MemoryManager;
use crate::process::Pcb;
use crate::queue::ReadyQueue;

/// A PCB plus the burst length it has been granted.
pub(crate) struct Assignment {
    pub pcb: Arc<Pcb>,
    pub quantum: u64,
}

/// Everything a worker thread needs to share with the rest of the engine.
pub(crate) struct WorkerContext {
    pub running: Arc<AtomicBool>,
    pub clock: Arc<GlobalClock>,
    pub ready: ReadyQueue<Arc<Pcb>>,
    pub running_list: Arc<Mutex<Vec<Arc<Pcb>>>>,
    pub finished_list: Arc<Mutex<Vec<Arc<Pcb>>>>,
    pub memory: Arc<MemoryManager>,
    /// A step happens only on ticks divisible by `delay_per_exec + 1`.
    pub delay_per_exec: u64,
    /// Where completed processes flush their `<name>.txt` logs.
    pub output_dir: PathBuf,
}

impl WorkerContext {
    fn move_to_running(&self, pcb: &Arc<Pcb>) {
        self.running_list.lock().unwrap().push(Arc::clone(pcb));
    }

    /// Completion migration. Lock order: running before finished; the
    /// only place both are held.
    fn migrate_to_finished(&self, pcb: &Arc<Pcb>) {
        let mut running = self.running_list.lock().unwrap();
        let mut finished = self.finished_list.lock().unwrap();
        running.retain(|p| !Arc::ptr_eq(p, pcb));
        finished.push(Arc::clone(pcb));
    }

    /// Preemption path: leave the running list and rejoin the ready queue
    /// at the tail.
    fn requeue(&self, pcb: Arc<Pcb>) {
        {
            let mut running = self.running_list.lock().unwrap();
            running.retain(|p| !Arc::ptr_eq(p, &pcb));
        }
        self.ready.push(pcb);
    }
}

/// One simulated CPU core.
pub struct CpuWorker {
    core_id: u32,
    idle: AtomicBool,
    shutdown: AtomicBool,
    slot: Mutex<Option<Assignment>>,
    wakeup: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpuWorker {
    /// Spawn the worker thread for `core_id`.
    pub(crate) fn spawn(core_id: u32, ctx: WorkerContext) -> Arc<CpuWorker> {
        let worker = Arc::new(CpuWorker {
            core_id,
            idle: AtomicBool::new(true),
            shutdown: AtomicBool::new(false),
            slot: Mutex::new(None),
            wakeup: Condvar::new(),
            handle: Mutex::new(None),
        });

        let runner = Arc::clone(&worker);
        let handle = thread::Builder::new()
            .name(format!("osprey-cpu-{}", core_id))
            .spawn(move || runner.run(ctx))
            .expect("failed to spawn worker thread");
        *worker.handle.lock().unwrap() = Some(handle);

        worker
    }

    pub fn core_id(&self) -> u32 {
        self.core_id
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// Hand the worker a burst. Must only be called while the worker is
    /// idle; the single dispatcher thread guarantees that.
    pub(crate) fn assign(&self, pcb: Arc<Pcb>, quantum: u64) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(Assignment { pcb, quantum });
        self.idle.store(false, Ordering::Release);
        self.wakeup.notify_one();
    }

    /// Request shutdown and wake the thread if it is waiting for work.
    pub fn stop(&self) {
        let _slot = self.slot.lock().unwrap();
        self.shutdown.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    /// Join the worker thread. Call after [`stop`](CpuWorker::stop).
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn run(&self, ctx: WorkerContext) {
        loop {
            let assignment = {
                let mut slot = self.slot.lock().unwrap();
                loop {
                    if self.is_shutdown() {
                        return;
                    }
                    if let Some(a) = slot.take() {
                        break a;
                    }
                    slot = self.wakeup.wait(slot).unwrap();
                }
            };

            self.execute_burst(assignment, &ctx);
            self.idle.store(true, Ordering::Release);
        }
    }

    /// Run one burst: up to `quantum` steps, one per fresh tick.
    fn execute_burst(&self, assignment: Assignment, ctx: &WorkerContext) {
        let Assignment { pcb, quantum } = assignment;

        pcb.set_assigned_core(Some(self.core_id));
        ctx.move_to_running(&pcb);

        let stopped = |this: &Self| !ctx.running.load(Ordering::Acquire) || this.is_shutdown();

        let mut last_seen = ctx.clock.now();
        let mut steps = 0u64;
        while steps < quantum && !pcb.is_complete() && !stopped(self) {
            let advanced = ctx
                .clock
                .wait_past(last_seen, || stopped(self));
            if !advanced || stopped(self) {
                break;
            }
            last_seen = ctx.clock.now();

            // The delay gate: exactly one step every delay_per_exec + 1
            // ticks, keeping all cores aligned on the same tick grid.
            if last_seen % (ctx.delay_per_exec + 1) == 0 {
                pcb.step();
                steps += 1;
            }
        }

        if pcb.is_complete() {
            pcb.mark_finished();
            pcb.set_assigned_core(None);
            ctx.memory.free(pcb.pid());
            ctx.migrate_to_finished(&pcb);
            let _ = pcb.write_log(&ctx.output_dir);
        } else {
            pcb.set_assigned_core(None);
            ctx.requeue(pcb);
        }
    }
}

impl std::fmt::Debug for CpuWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuWorker")
            .field("core_id", &self.core_id)
            .field("idle", &self.is_idle())
            .field("shutdown", &self.is_shutdown())
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
    use osprey_core::instruction::Instruction;
    use std::time::{Duration, Instant};

    fn test_context(delay: u64) -> (WorkerContext, Arc<GlobalClock>, Arc<AtomicBool>) {
        let clock = Arc::new(GlobalClock::new());
        let running = Arc::new(AtomicBool::new(true));
        let ctx = WorkerContext {
            running: Arc::clone(&running),
            clock: Arc::clone(&clock),
            ready: ReadyQueue::new(),
            running_list: Arc::new(Mutex::new(Vec::new())),
            finished_list: Arc::new(Mutex::new(Vec::new())),
            memory: Arc::new(MemoryManager::new(64)),
            delay_per_exec: delay,
            output_dir: std::env::temp_dir(),
        };
        (ctx, clock, running)
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn burst_completes_a_process_and_migrates_it() {
        let (ctx, clock, running) = test_context(0);
        let finished = Arc::clone(&ctx.finished_list);
        let running_list = Arc::clone(&ctx.running_list);
        let memory = Arc::clone(&ctx.memory);

        let pcb = Arc::new(Pcb::new(
            "w-complete",
            vec![
                Instruction::Declare("x".into(), Atom::Number(5)),
                Instruction::Add("x".into(), Atom::name("x"), Atom::Number(3)),
                Instruction::Print(Atom::name("x")),
            ],
        ));
        assert!(memory.allocate(pcb.pid(), 16));

        let worker = CpuWorker::spawn(0, ctx);
        worker.assign(Arc::clone(&pcb), pcb.total_ticks());

        // Drive the clock until the worker finishes the burst.
        assert!(wait_until(Duration::from_secs(5), || {
            clock.advance();
            thread::sleep(Duration::from_millis(2));
            worker.is_idle() && pcb.is_complete()
        }));

        assert_eq!(pcb.variable("x"), Some(8));
        assert!(pcb.finished_at().is_some());
        assert!(!memory.is_allocated(pcb.pid()), "memory must be released");
        assert!(finished.lock().unwrap().iter().any(|p| Arc::ptr_eq(p, &pcb)));
        assert!(running_list.lock().unwrap().is_empty());
        assert_eq!(pcb.assigned_core(), None);

        running.store(false, Ordering::Release);
        worker.stop();
        clock.interrupt();
        worker.join();
        std::fs::remove_file(std::env::temp_dir().join("w-complete.txt")).ok();
    }

    #[test]
    fn exhausted_quantum_requeues_at_the_tail() {
        let (ctx, clock, running) = test_context(0);
        let ready = ctx.ready.clone();
        let running_list = Arc::clone(&ctx.running_list);

        let pcb = Arc::new(Pcb::new(
            "w-preempt",
            vec![
                Instruction::Print(Atom::str("a")),
                Instruction::Print(Atom::str("b")),
                Instruction::Print(Atom::str("c")),
            ],
        ));

        let worker = CpuWorker::spawn(0, ctx);
        worker.assign(Arc::clone(&pcb), 2);

        assert!(wait_until(Duration::from_secs(5), || {
            clock.advance();
            thread::sleep(Duration::from_millis(2));
            worker.is_idle()
        }));

        assert_eq!(pcb.cursor(), 2);
        assert!(!pcb.is_complete());
        assert_eq!(pcb.assigned_core(), None);
        assert_eq!(ready.len(), 1, "preempted PCB must be back in the queue");
        assert!(running_list.lock().unwrap().is_empty());

        running.store(false, Ordering::Release);
        worker.stop();
        clock.interrupt();
        worker.join();
    }

    #[test]
    fn shutdown_interrupts_a_waiting_burst() {
        let (ctx, clock, running) = test_context(0);
        let pcb = Arc::new(Pcb::new(
            "w-interrupted",
            vec![Instruction::Print(Atom::str("never"))],
        ));

        let worker = CpuWorker::spawn(0, ctx);
        worker.assign(Arc::clone(&pcb), 1);
        thread::sleep(Duration::from_millis(20));

        // No ticks ever arrive; shutdown must still unblock the worker.
        running.store(false, Ordering::Release);
        worker.stop();
        clock.interrupt();
        worker.join();
        assert!(!pcb.is_complete());
    }

    #[test]
    fn idle_worker_stops_promptly() {
        let (ctx, _clock, _running) = test_context(0);
        let worker = CpuWorker::spawn(3, ctx);
        assert!(worker.is_idle());
        assert_eq!(worker.core_id(), 3);
        worker.stop();
        worker.join();
    }
}
