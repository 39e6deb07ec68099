//! Scheduler façade: lifecycle, dispatch, the clock thread, and reports.
//!
//! [`Scheduler::start`] brings up the engine: memory manager, one worker
//! per core, the global clock thread, and the dispatcher thread.
//! [`Scheduler::stop`] tears it down in reverse-dependency order: batch
//! generator first, then the dispatcher (unblocked by shutting the ready
//! queue), then the workers, then the clock. Every blocking wait in the
//! engine has a shutdown clause, so a clean stop never hangs.
//!
//! Lock order across the engine: memory < queue < registry < running <
//! finished < clock. No code path takes them in reverse.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use osprey_core::config::{Config, SchedulingAlgorithm};

use crate::clock::{GlobalClock, TICK_INTERVAL_MS};
use crate::generator::InstructionGenerator;
use crate::memory::MemoryManager;
use crate::process::Pcb;
use crate::queue::ReadyQueue;
use crate::worker::{CpuWorker, WorkerContext};

/// Dispatcher back-off after a failed memory admission.
const ADMISSION_BACKOFF: Duration = Duration::from_millis(50);
/// Dispatcher back-off while every core is busy.
const CORE_BACKOFF: Duration = Duration::from_millis(1);
/// Wall period of the batch generator's own loop.
const GENERATOR_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the dispatcher thread needs, cloned out of the façade.
struct DispatchContext {
    running: Arc<AtomicBool>,
    ready: ReadyQueue<Arc<Pcb>>,
    memory: Arc<MemoryManager>,
    workers: Vec<Arc<CpuWorker>>,
    algorithm: SchedulingAlgorithm,
    quantum_cycles: u64,
    mem_per_proc: u32,
}

/// The emulator's scheduling engine.
///
/// Construct once, [`start`](Scheduler::start) with a configuration, submit
/// processes, and [`stop`](Scheduler::stop) when done. The registry and the
/// finished list outlive a run so reports remain available after shutdown.
pub struct Scheduler {
    running: Arc<AtomicBool>,
    batch_generating: Arc<AtomicBool>,
    clock: Arc<GlobalClock>,
    ready: ReadyQueue<Arc<Pcb>>,
    registry: Arc<Mutex<HashMap<String, Arc<Pcb>>>>,
    running_list: Arc<Mutex<Vec<Arc<Pcb>>>>,
    finished_list: Arc<Mutex<Vec<Arc<Pcb>>>>,
    memory: Mutex<Option<Arc<MemoryManager>>>,
    workers: Vec<Arc<CpuWorker>>,
    dispatcher: Option<JoinHandle<()>>,
    clock_thread: Option<JoinHandle<()>>,
    generator_thread: Option<JoinHandle<()>>,
    process_counter: Arc<AtomicU32>,
    stamp_counter: Arc<AtomicU64>,
    output_dir: PathBuf,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            batch_generating: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(GlobalClock::new()),
            ready: ReadyQueue::new(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            running_list: Arc::new(Mutex::new(Vec::new())),
            finished_list: Arc::new(Mutex::new(Vec::new())),
            memory: Mutex::new(None),
            workers: Vec::new(),
            dispatcher: None,
            clock_thread: None,
            generator_thread: None,
            process_counter: Arc::new(AtomicU32::new(0)),
            stamp_counter: Arc::new(AtomicU64::new(0)),
            output_dir: PathBuf::from("."),
        }
    }

    /// Directory receiving memory stamps and per-process logs. Must be set
    /// before [`start`](Scheduler::start).
    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of simulated cores in the current run.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Ticks elapsed on the current (or most recent) run's clock.
    pub fn ticks(&self) -> u64 {
        self.clock.now()
    }

    /// Handle to the current run's memory manager, if started.
    pub fn memory_manager(&self) -> Option<Arc<MemoryManager>> {
        self.memory.lock().unwrap().clone()
    }

    // -- lifecycle --------------------------------------------------------

    /// Bring up the engine: memory manager, workers, clock, dispatcher.
    ///
    /// Idempotent; a second call while running is a no-op. A normalized
    /// [`Config`] always carries at least one core; a `cpu_count` of 0
    /// (possible only for a configuration built without
    /// [`normalize`](Config::normalize)) falls back to the host's
    /// available parallelism so the dispatcher always has a core to scan.
    pub fn start(&mut self, config: &Config) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let cpu_count = if config.cpu_count == 0 {
            num_cpus::get().max(1) as u32
        } else {
            config.cpu_count
        };

        // A queue left shut down by a previous run cannot carry new work.
        if self.ready.is_shutdown() {
            self.ready = ReadyQueue::new();
        }
        self.clock = Arc::new(GlobalClock::new());

        let memory = Arc::new(MemoryManager::new(config.max_overall_mem));
        *self.memory.lock().unwrap() = Some(Arc::clone(&memory));

        self.workers = (0..cpu_count)
            .map(|core_id| {
                CpuWorker::spawn(
                    core_id,
                    WorkerContext {
                        running: Arc::clone(&self.running),
                        clock: Arc::clone(&self.clock),
                        ready: self.ready.clone(),
                        running_list: Arc::clone(&self.running_list),
                        finished_list: Arc::clone(&self.finished_list),
                        memory: Arc::clone(&memory),
                        delay_per_exec: u64::from(config.delay_per_exec),
                        output_dir: self.output_dir.clone(),
                    },
                )
            })
            .collect();

        self.clock_thread = Some(self.spawn_clock_thread(config, Arc::clone(&memory)));

        let ctx = DispatchContext {
            running: Arc::clone(&self.running),
            ready: self.ready.clone(),
            memory,
            workers: self.workers.clone(),
            algorithm: config.scheduler,
            quantum_cycles: u64::from(config.quantum_cycles),
            mem_per_proc: config.mem_per_proc,
        };
        self.dispatcher = Some(
            thread::Builder::new()
                .name("osprey-dispatch".into())
                .spawn(move || dispatch_loop(ctx))
                .expect("failed to spawn dispatcher thread"),
        );
    }

    /// Tear the engine down and join every thread.
    ///
    /// Idempotent. Join order: generator, dispatcher, workers, clock. The
    /// memory manager is destroyed last; any process caught mid-run keeps
    /// its allocation until then.
    pub fn stop(&mut self) {
        self.stop_batch_generation();

        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        for worker in &self.workers {
            worker.stop();
        }
        self.ready.shutdown();
        self.clock.interrupt();

        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for worker in &self.workers {
            worker.join();
        }
        self.workers.clear();
        if let Some(handle) = self.clock_thread.take() {
            let _ = handle.join();
        }

        *self.memory.lock().unwrap() = None;
    }

    fn spawn_clock_thread(&self, config: &Config, memory: Arc<MemoryManager>) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let clock = Arc::clone(&self.clock);
        let stamp_counter = Arc::clone(&self.stamp_counter);
        let quantum = u64::from(config.quantum_cycles.max(1));
        let output_dir = self.output_dir.clone();

        thread::Builder::new()
            .name("osprey-clock".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    let tick = clock.advance();
                    if tick % quantum == 0 {
                        let index = stamp_counter.fetch_add(1, Ordering::AcqRel) + 1;
                        let path = output_dir.join(format!("memory_stamp_{}.txt", index));
                        // Report I/O failures are not fatal to the run.
                        let _ = memory.write_snapshot(&path);
                    }
                }
                // Wake any worker still parked on the tick gate.
                clock.interrupt();
            })
            .expect("failed to spawn clock thread")
    }

    // -- process management -----------------------------------------------

    /// Register a process and queue it for dispatch.
    ///
    /// Name uniqueness is the caller's responsibility; a duplicate name
    /// replaces the registry entry (the old PCB stays reachable through
    /// the running/finished lists until it drains).
    pub fn submit_process(&self, pcb: Arc<Pcb>) {
        self.registry
            .lock()
            .unwrap()
            .insert(pcb.name().to_string(), Arc::clone(&pcb));
        self.ready.push(pcb);
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Pcb>> {
        self.registry.lock().unwrap().get(name).cloned()
    }

    /// Number of processes ever registered.
    pub fn process_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    // -- batch generation -------------------------------------------------

    /// Start the batch generator thread. One random process is created
    /// every `batch_process_freq` iterations of its wall loop.
    pub fn start_batch_generation(&mut self, config: &Config) {
        if self.batch_generating.swap(true, Ordering::AcqRel) {
            return;
        }

        let generating = Arc::clone(&self.batch_generating);
        let registry = Arc::clone(&self.registry);
        let ready = self.ready.clone();
        let counter = Arc::clone(&self.process_counter);
        let freq = config.batch_process_freq.max(1);
        let min_ins = config.min_instructions;
        let max_ins = config.max_instructions;

        self.generator_thread = Some(
            thread::Builder::new()
                .name("osprey-batchgen".into())
                .spawn(move || {
                    let mut generator = InstructionGenerator::new();
                    let mut cycles: u32 = 0;
                    while generating.load(Ordering::Acquire) {
                        cycles = cycles.wrapping_add(1);
                        if cycles % freq == 0 {
                            let name = loop {
                                let n = counter.fetch_add(1, Ordering::AcqRel) + 1;
                                let candidate = format!("p{:02}", n);
                                if !registry.lock().unwrap().contains_key(&candidate) {
                                    break candidate;
                                }
                            };
                            let program = generator.random_program(min_ins, max_ins);
                            let pcb = Arc::new(Pcb::new(name.clone(), program));
                            registry.lock().unwrap().insert(name, Arc::clone(&pcb));
                            ready.push(pcb);
                        }
                        thread::sleep(GENERATOR_INTERVAL);
                    }
                })
                .expect("failed to spawn batch generator thread"),
        );
    }

    /// Stop and join the batch generator. Idempotent.
    pub fn stop_batch_generation(&mut self) {
        self.batch_generating.store(false, Ordering::Release);
        if let Some(handle) = self.generator_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn is_batch_generating(&self) -> bool {
        self.batch_generating.load(Ordering::Acquire)
    }

    // -- reports ----------------------------------------------------------

    /// Total cores, cores in use, and utilization truncated to a whole
    /// percent.
    pub fn cpu_utilization(&self) -> (usize, usize, u32) {
        let total = self.workers.len();
        let used = self.running_list.lock().unwrap().len();
        let percent = if total > 0 { (used * 100 / total) as u32 } else { 0 };
        (total, used, percent)
    }

    /// Write the CPU report: utilization header, then the running and
    /// finished process status lines.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let (total, used, percent) = self.cpu_utilization();
        writeln!(out, "CPU utilization: {}%", percent)?;
        writeln!(out, "Cores used: {}", used)?;
        writeln!(out, "Cores available: {}", total - used)?;
        writeln!(out)?;

        writeln!(out, "Running processes:")?;
        for pcb in self.running_list.lock().unwrap().iter() {
            writeln!(out, "{}", pcb.status())?;
        }
        writeln!(out)?;

        writeln!(out, "Finished processes:")?;
        for pcb in self.finished_list.lock().unwrap().iter() {
            writeln!(out, "{}", pcb.status())?;
        }
        Ok(())
    }

    /// Write the CPU report to `path`.
    pub fn generate_report(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        self.write_report(&mut file)
    }

    /// Render the report as a string, for console display.
    pub fn status_report(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_report(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Pull ready processes, reserve memory, and hand them to idle cores.
///
/// Admission comes first: a process that cannot get (or keep) its memory
/// reservation goes back to the tail and the dispatcher backs off briefly,
/// so a saturated heap cannot spin the queue. Workers are scanned in
/// core-id order; the lowest idle core wins.
fn dispatch_loop(ctx: DispatchContext) {
    while ctx.running.load(Ordering::Acquire) {
        let Some(pcb) = ctx.ready.wait_and_pop() else {
            break;
        };

        let admitted = ctx.memory.is_allocated(pcb.pid())
            || ctx.memory.allocate(pcb.pid(), ctx.mem_per_proc);
        if !admitted {
            ctx.ready.push(pcb);
            thread::sleep(ADMISSION_BACKOFF);
            continue;
        }

        let mut dispatched = false;
        while !dispatched && ctx.running.load(Ordering::Acquire) {
            for worker in &ctx.workers {
                if worker.is_idle() {
                    let remaining = pcb.remaining_ticks();
                    let quantum = match ctx.algorithm {
                        SchedulingAlgorithm::Fcfs => remaining,
                        SchedulingAlgorithm::RoundRobin => ctx.quantum_cycles.min(remaining),
                    };
                    worker.assign(Arc::clone(&pcb), quantum);
                    dispatched = true;
                    break;
                }
            }
            if !dispatched {
                thread::sleep(CORE_BACKOFF);
            }
        }

        if !dispatched {
            // Shutdown won the race; leave the process queued for
            // bookkeeping (the push is dropped once the queue is down).
            ctx.ready.push(pcb);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
