//! The console-facing facade (spec §4.6): process creation/admission,
//! lifecycle bookkeeping, and the snapshot queries the CLI renders.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use config::{Algorithm, Config};
use ids::{CoreId, ProcessId, ProcessIdGenerator};
use thiserror::Error;

use crate::batch::BatchGenerator;
use crate::interpreter::RuntimeFault;
use crate::memory::{AdmissionError, BackingStore, DemandPagingAllocator, ReplacementPolicy};
use crate::process::{parse_program, ParsedCommand, Process, ProcessStatus, ProgramParseError};
use crate::randgen::{random_memory_demand, random_program};
use crate::scheduler::{Scheduler, SchedulerError};

#[derive(Debug, Error)]
pub enum CreateProcessError {
    #[error("a process named `{0}` already exists and has not finished")]
    NameInUse(String),
    #[error("requested memory is outside the configured [{min}, {max}] bounds")]
    MemoryOutOfRange { min: u32, max: u32 },
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Program(#[from] ProgramParseError),
}

/// A lightweight view of a process, cheap to clone out from under the
/// scheduler's lock (spec §4.6).
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub id: ProcessId,
    pub name: String,
    pub status: ProcessStatus,
    pub core: Option<CoreId>,
    pub created_at: DateTime<Local>,
    pub finish_time: Option<DateTime<Local>>,
    pub current_line: usize,
    pub total_lines: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessDetail {
    pub summary: ProcessSummary,
    pub log: Vec<String>,
    pub fault: Option<(RuntimeFault, DateTime<Local>)>,
    pub memory_required: u32,
    pub pages_allocated: usize,
    pub pages_resident: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub total_bytes: u32,
    pub used_bytes: u32,
    pub free_bytes: u32,
    pub total_cpu_ticks: u64,
    pub active_cpu_ticks: u64,
    pub idle_cpu_ticks: u64,
    pub pages_paged_in: u64,
    pub pages_paged_out: u64,
}

struct SystemInner {
    scheduler: Scheduler,
    config: Config,
    id_gen: ProcessIdGenerator,
    batch_seq: AtomicU64,
    batch: Mutex<Option<BatchGenerator>>,
}

/// Cheap to clone: every clone shares the same underlying scheduler and
/// process tables (spec §9, cyclic-ownership note).
#[derive(Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

impl System {
    /// Builds subsystems from `config` and truncates the backing-store file
    /// (spec §6, `initialize`).
    pub fn initialize(config: Config, backing_store_path: impl AsRef<Path>) -> io::Result<Self> {
        let backing = BackingStore::new(backing_store_path, config.mem_per_frame)?;
        let allocator = DemandPagingAllocator::new(
            config.frame_count() as usize,
            config.mem_per_frame,
            ReplacementPolicy::Fifo,
            backing,
        );
        let scheduler = Scheduler::new(config.num_cpu as usize, Box::new(allocator));
        scheduler.set_algorithm(config.scheduler);
        scheduler.set_quantum(config.quantum_cycles);
        scheduler.set_delays_per_execution(config.delays_per_exec);

        Ok(Self {
            inner: Arc::new(SystemInner {
                scheduler,
                config,
                id_gen: ProcessIdGenerator::new(),
                batch_seq: AtomicU64::new(0),
                batch: Mutex::new(None),
            }),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Starts the dispatch thread and the batch generator together. Safe to
    /// call repeatedly; a scheduler already running is left alone.
    pub fn start_scheduler(&self) -> Result<(), SchedulerError> {
        self.inner.scheduler.start()?;
        let mut batch = self.inner.batch.lock().unwrap_or_else(|e| e.into_inner());
        if batch.is_none() {
            *batch = Some(BatchGenerator::start(
                self.clone(),
                self.inner.config.batch_process_freq as u64,
            ));
        }
        Ok(())
    }

    /// Stops batch generation only; the dispatch thread keeps draining
    /// already-admitted processes (spec §9, the "scheduler-stop" Open
    /// Question, resolved per the specification's own adopted behavior).
    pub fn stop_scheduler(&self) {
        if let Some(mut batch) = self.inner.batch.lock().unwrap_or_else(|e| e.into_inner()).take() {
            batch.stop();
        }
    }

    /// Full teardown used by `exit` (spec §6): stops the batch generator and
    /// the dispatch thread.
    pub fn shutdown(&self) {
        self.stop_scheduler();
        self.inner.scheduler.stop();
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.inner
            .scheduler
            .with_state(|inner| inner.processes.values().any(|p| p.name == name))
    }

    /// `screen -s` (spec §6): a process with a randomly generated program.
    pub fn create_process(&self, name: &str, memory_required: Option<u32>) -> Result<ProcessId, CreateProcessError> {
        let cfg = &self.inner.config;
        let mem = self.resolve_memory(memory_required)?;
        let program = random_program(cfg.min_ins, cfg.max_ins);
        self.admit(name, program, mem)
    }

    /// `screen -c` (spec §6): a process with an explicit instruction body.
    pub fn create_custom_process(
        &self,
        name: &str,
        source: &str,
        memory_required: Option<u32>,
    ) -> Result<ProcessId, CreateProcessError> {
        let mem = self.resolve_memory(memory_required)?;
        let program = parse_program(source)?;
        self.admit(name, program, mem)
    }

    fn resolve_memory(&self, requested: Option<u32>) -> Result<u32, CreateProcessError> {
        let cfg = &self.inner.config;
        match requested {
            Some(m) if m < cfg.min_mem_per_proc || m > cfg.max_mem_per_proc => {
                Err(CreateProcessError::MemoryOutOfRange {
                    min: cfg.min_mem_per_proc,
                    max: cfg.max_mem_per_proc,
                })
            }
            Some(m) => Ok(m),
            None => Ok(random_memory_demand(cfg.min_mem_per_proc, cfg.max_mem_per_proc)),
        }
    }

    fn admit(
        &self,
        name: &str,
        program: Vec<ParsedCommand>,
        memory_required: u32,
    ) -> Result<ProcessId, CreateProcessError> {
        if self.name_in_use(name) {
            return Err(CreateProcessError::NameInUse(name.to_string()));
        }
        let pid = self.inner.id_gen.next();
        let mut process = Process::new(pid, name.to_string(), program, memory_required, Local::now());

        match self.inner.scheduler.algorithm() {
            Some(Algorithm::Rr) => {
                self.inner
                    .scheduler
                    .add_to_rr_pending(process)
                    .expect("RR algorithm confirmed above");
            }
            _ => {
                // FCFS admission is synchronous at creation (spec §2).
                let pages = self.inner.scheduler.try_allocate(pid, memory_required)?;
                process.pages_allocated = pages;
                self.inner.scheduler.add_process(process);
            }
        }
        Ok(pid)
    }

    pub(crate) fn create_batch_process(&self) {
        let n = self.inner.batch_seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("process_{n}");
        match self.create_process(&name, None) {
            Ok(_) => log::debug!("batch generator created {name}"),
            Err(err) => log::warn!("batch generator could not create {name}: {err}"),
        }
    }

    pub fn list_active(&self) -> Vec<ProcessSummary> {
        self.inner.scheduler.with_state(|inner| {
            inner
                .processes
                .values()
                .filter(|p| !is_pending_admission(p))
                .map(summarize)
                .collect()
        })
    }

    /// Processes parked awaiting memory admission under RR (spec §4.6).
    pub fn list_pending(&self) -> Vec<ProcessSummary> {
        self.inner.scheduler.with_state(|inner| {
            inner
                .processes
                .values()
                .filter(|p| is_pending_admission(p))
                .map(summarize)
                .collect()
        })
    }

    pub fn list_finished(&self) -> Vec<ProcessSummary> {
        self.inner
            .scheduler
            .with_state(|inner| inner.finished.values().map(summarize).collect())
    }

    pub fn get_process(&self, name: &str) -> Option<ProcessDetail> {
        self.inner.scheduler.with_state(|inner| {
            let process = inner
                .processes
                .values()
                .chain(inner.finished.values())
                .find(|p| p.name == name)?;
            let pages_resident = inner.allocator.pages_resident(process.id);
            Some(ProcessDetail {
                summary: summarize(process),
                log: process.log.clone(),
                fault: process.fault.as_ref().map(|f| (f.kind.clone(), f.at)),
                memory_required: process.memory_required,
                pages_allocated: process.pages_allocated,
                pages_resident,
            })
        })
    }

    /// Removes a finished process from the finished map by name (spec
    /// §4.6). Returns whether a process was removed.
    pub fn cleanup_terminated(&self, name: &str) -> bool {
        self.inner.scheduler.with_state_mut(|inner| {
            if let Some(pid) = inner.finished.values().find(|p| p.name == name).map(|p| p.id) {
                inner.finished.remove(&pid);
                true
            } else {
                false
            }
        })
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.inner.scheduler.with_state(|inner| {
            let frame_size = inner.allocator.frame_size();
            let total_frames = inner.allocator.frame_count();
            let free_frames = inner.allocator.free_frame_count();
            let used_frames = total_frames - free_frames;
            MemoryStats {
                total_bytes: frame_size * total_frames as u32,
                used_bytes: frame_size * used_frames as u32,
                free_bytes: frame_size * free_frames as u32,
                total_cpu_ticks: inner.total_cpu_ticks,
                active_cpu_ticks: inner.active_cpu_ticks,
                idle_cpu_ticks: inner.idle_cpu_ticks,
                pages_paged_in: inner.allocator.pages_paged_in(),
                pages_paged_out: inner.allocator.pages_paged_out(),
            }
        })
    }

    pub fn backing_store_records(&self) -> Vec<(ProcessId, u32, Vec<u8>)> {
        self.inner
            .scheduler
            .with_state(|inner| inner.allocator.backing_store_records())
    }
}

/// Paused, not sleeping, and not currently assigned a core: the RR-only
/// "awaiting memory admission" state (spec §3).
fn is_pending_admission(process: &Process) -> bool {
    process.status == ProcessStatus::Paused && !process.sleeping && process.core.is_none()
}

fn summarize(process: &Process) -> ProcessSummary {
    ProcessSummary {
        id: process.id,
        name: process.name.clone(),
        status: process.status,
        core: process.core,
        created_at: process.created_at,
        finish_time: process.finish_time,
        current_line: process.ip.min(process.program.len()),
        total_lines: process.program.len(),
    }
}
