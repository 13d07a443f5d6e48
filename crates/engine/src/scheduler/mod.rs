//! The multi-core dispatcher (spec §4.1, §5).
//!
//! A single mutex guards every piece of shared scheduler, memory, and
//! process-table state; a condition variable wakes the dispatch thread on
//! `add_process`, `mark_core_available`, sleeper wake-up, and `stop`
//! (spec §5).

mod dispatch;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use config::Algorithm;
use ids::{CoreId, ProcessId, Tick};
use thiserror::Error;

use crate::memory::{AdmissionError, MemoryAllocator};
use crate::process::{Process, ProcessStatus};

/// One tick of simulated time equals this much wall-clock time (spec §4.1).
pub const TICK_MS: u64 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no scheduling algorithm has been selected")]
    NoAlgorithmSet,
    #[error("add_to_rr_pending is only valid under round-robin")]
    NotRoundRobin,
}

/// A process parked in the sleeping list (spec §3). `core` is retained only
/// for log/diagnostic purposes.
#[derive(Debug, Clone, Copy)]
struct SleepingProcess {
    pid: ProcessId,
    wake_tick: Tick,
    core: CoreId,
}

pub(crate) struct Inner {
    pub(crate) processes: HashMap<ProcessId, Process>,
    pub(crate) finished: HashMap<ProcessId, Process>,
    pub(crate) allocator: Box<dyn MemoryAllocator>,

    pub(crate) algorithm: Option<Algorithm>,
    pub(crate) quantum: u32,
    pub(crate) delay: u32,

    pub(crate) num_cores: usize,
    pub(crate) core_available: Vec<bool>,
    pub(crate) core_assignment: Vec<Option<ProcessId>>,

    pub(crate) fcfs_queues: Vec<VecDeque<ProcessId>>,
    pub(crate) fcfs_next_core: usize,
    pub(crate) rr_ready: VecDeque<ProcessId>,
    pub(crate) rr_pending: VecDeque<ProcessId>,
    pub(crate) sleeping: Vec<SleepingProcess>,

    pub(crate) sim_tick: Tick,
    pub(crate) total_cpu_ticks: u64,
    pub(crate) active_cpu_ticks: u64,
    pub(crate) idle_cpu_ticks: u64,

    pub(crate) stop_requested: bool,
    pub(crate) termination_callback: Option<Box<dyn FnMut(ProcessId) + Send>>,
}

impl Inner {
    fn new(num_cores: usize, allocator: Box<dyn MemoryAllocator>) -> Self {
        Self {
            processes: HashMap::new(),
            finished: HashMap::new(),
            allocator,
            algorithm: None,
            quantum: 1,
            delay: 0,
            num_cores,
            core_available: vec![true; num_cores],
            core_assignment: vec![None; num_cores],
            fcfs_queues: (0..num_cores).map(|_| VecDeque::new()).collect(),
            fcfs_next_core: 0,
            rr_ready: VecDeque::new(),
            rr_pending: VecDeque::new(),
            sleeping: Vec::new(),
            sim_tick: Tick::ZERO,
            total_cpu_ticks: 0,
            active_cpu_ticks: 0,
            idle_cpu_ticks: 0,
            stop_requested: false,
            termination_callback: None,
        }
    }

    fn enqueue_ready(&mut self, pid: ProcessId) {
        match self.algorithm {
            Some(Algorithm::Fcfs) | None => {
                let core = self.fcfs_next_core;
                self.fcfs_next_core = (self.fcfs_next_core + 1) % self.num_cores.max(1);
                self.fcfs_queues[core].push_back(pid);
            }
            Some(Algorithm::Rr) => self.rr_ready.push_back(pid),
        }
    }

    fn quiescent(&self) -> bool {
        self.fcfs_queues.iter().all(VecDeque::is_empty)
            && self.rr_ready.is_empty()
            && self.rr_pending.is_empty()
            && self.sleeping.is_empty()
            && self.core_assignment.iter().all(Option::is_none)
    }

    fn reset_core_states(&mut self) {
        self.core_available = vec![true; self.num_cores];
        self.core_assignment = vec![None; self.num_cores];
        self.fcfs_next_core = 0;
    }

    fn handle_termination(&mut self, pid: ProcessId) {
        if let Some(mut process) = self.processes.remove(&pid) {
            process.core = None;
            self.allocator.deallocate(pid);
            process.pages_allocated = 0;
            self.finished.insert(pid, process);
        }
        if let Some(cb) = self.termination_callback.as_mut() {
            cb(pid);
        }
    }
}

/// The public scheduler handle (spec §4.1).
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    cv: Arc<Condvar>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(num_cores: usize, allocator: Box<dyn MemoryAllocator>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(num_cores, allocator))),
            cv: Arc::new(Condvar::new()),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_algorithm(&self, algorithm: Algorithm) {
        self.lock().algorithm = Some(algorithm);
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.lock().algorithm
    }

    pub fn set_quantum(&self, quantum: u32) {
        self.lock().quantum = quantum.max(1);
    }

    pub fn set_delays_per_execution(&self, delay: u32) {
        self.lock().delay = delay;
    }

    pub fn set_termination_callback(&self, cb: impl FnMut(ProcessId) + Send + 'static) {
        self.lock().termination_callback = Some(Box::new(cb));
    }

    /// Admits a process synchronously, for the FCFS path (spec §2: "under
    /// FCFS admission is synchronous at creation").
    pub fn try_allocate(&self, pid: ProcessId, memory_required: u32) -> Result<usize, AdmissionError> {
        self.lock().allocator.allocate(pid, memory_required)
    }

    /// Enqueues an already-admitted process as READY (spec §4.1).
    pub fn add_process(&self, mut process: Process) {
        if process.status == ProcessStatus::Terminated {
            log::warn!("add_process given an already-terminated process; ignoring");
            return;
        }
        process.status = ProcessStatus::Ready;
        let pid = process.id;
        let mut inner = self.lock();
        inner.processes.insert(pid, process);
        inner.enqueue_ready(pid);
        drop(inner);
        self.cv.notify_all();
    }

    /// Parks a not-yet-admitted process awaiting memory (spec §4.1, RR
    /// only).
    pub fn add_to_rr_pending(&self, mut process: Process) -> Result<(), SchedulerError> {
        let mut inner = self.lock();
        if inner.algorithm != Some(Algorithm::Rr) {
            return Err(SchedulerError::NotRoundRobin);
        }
        process.status = ProcessStatus::Paused;
        let pid = process.id;
        inner.processes.insert(pid, process);
        inner.rr_pending.push_back(pid);
        drop(inner);
        self.cv.notify_all();
        Ok(())
    }

    pub fn mark_core_available(&self, core: CoreId) {
        let mut inner = self.lock();
        if core.get() >= inner.num_cores {
            return; // out-of-range core index is ignored (spec §4.1)
        }
        inner.core_assignment[core.get()] = None;
        inner.core_available[core.get()] = true;
        drop(inner);
        self.cv.notify_all();
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(()); // idempotent
        }
        if self.lock().algorithm.is_none() {
            log::error!("cannot start the scheduler: no algorithm selected");
            return Err(SchedulerError::NoAlgorithmSet);
        }

        self.lock().stop_requested = false;
        self.running.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let cv = Arc::clone(&self.cv);
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || dispatch::run_loop(inner, cv, running));
        *self.thread.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Safe to call from any thread other than the scheduler thread itself
    /// (spec §4.1).
    pub fn stop(&self) {
        {
            let mut inner = self.lock();
            inner.stop_requested = true;
        }
        self.cv.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
        self.lock().reset_core_states();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn total_cores(&self) -> usize {
        self.lock().num_cores
    }

    pub fn used_cores(&self) -> usize {
        self.lock().core_assignment.iter().filter(|a| a.is_some()).count()
    }

    pub fn available_cores(&self) -> usize {
        self.total_cores() - self.used_cores()
    }

    pub fn cpu_utilization(&self) -> f64 {
        let total = self.total_cores();
        if total == 0 {
            0.0
        } else {
            self.used_cores() as f64 / total as f64
        }
    }

    pub fn simulated_time(&self) -> Tick {
        self.lock().sim_tick
    }

    pub fn total_ticks(&self) -> u64 {
        self.lock().total_cpu_ticks
    }

    pub fn active_ticks(&self) -> u64 {
        self.lock().active_cpu_ticks
    }

    pub fn idle_ticks(&self) -> u64 {
        self.lock().idle_cpu_ticks
    }

    /// Runs `f` with shared access to the process table and allocator,
    /// under the scheduler's single lock (used by the facade for read-only
    /// queries and for memory/paging statistics).
    pub fn with_state<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        f(&self.lock())
    }

    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.lock())
    }
}

pub(crate) fn wall_ticks_since(last: Instant) -> (u64, Instant) {
    let now = Instant::now();
    let elapsed = now.saturating_duration_since(last);
    let ticks = elapsed.as_millis() as u64 / TICK_MS;
    (ticks, now)
}

pub(crate) const TICK_DURATION: Duration = Duration::from_millis(TICK_MS);
