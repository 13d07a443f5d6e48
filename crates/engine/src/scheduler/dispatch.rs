//! The dispatch thread body: FCFS and round-robin passes (spec §4.1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use config::Algorithm;
use ids::CoreId;

use crate::interpreter::{execute_one, StepOutcome};
use crate::process::ProcessStatus;

use super::{wall_ticks_since, Inner, TICK_DURATION};

pub(super) fn run_loop(inner: Arc<Mutex<Inner>>, cv: Arc<Condvar>, running: Arc<AtomicBool>) {
    let mut last_wall = Instant::now();

    loop {
        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());

        let (elapsed_ticks, now) = wall_ticks_since(last_wall);
        last_wall = now;
        if elapsed_ticks > 0 {
            guard.sim_tick = guard.sim_tick.advance(elapsed_ticks);
        }

        wake_sleepers(&mut guard);
        drain_rr_pending(&mut guard);

        if guard.stop_requested && guard.quiescent() {
            break;
        }

        let cores_active = match guard.algorithm {
            Some(Algorithm::Fcfs) | None => fcfs_pass(&mut guard),
            Some(Algorithm::Rr) => rr_pass(&mut guard),
        };

        guard.total_cpu_ticks += guard.num_cores as u64;
        guard.active_cpu_ticks += cores_active as u64;
        guard.idle_cpu_ticks += guard.num_cores as u64 - cores_active as u64;

        if guard.stop_requested && guard.quiescent() {
            break;
        }

        if cores_active == 0 {
            // Nothing ran this pass: wait for a wake-up event or the next
            // simulated tick boundary, whichever comes first.
            let (g, _) = cv.wait_timeout(guard, TICK_DURATION).unwrap_or_else(|e| e.into_inner());
            drop(g);
        } else {
            drop(guard);
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
}

fn wake_sleepers(inner: &mut Inner) {
    let now = inner.sim_tick;
    let (due, still_sleeping): (Vec<_>, Vec<_>) =
        inner.sleeping.drain(..).partition(|s| s.wake_tick <= now);
    inner.sleeping = still_sleeping;
    for sleeper in due {
        if let Some(process) = inner.processes.get_mut(&sleeper.pid) {
            process.sleeping = false;
            process.status = ProcessStatus::Ready;
        }
        inner.enqueue_ready(sleeper.pid);
    }
}

fn drain_rr_pending(inner: &mut Inner) {
    let pending = std::mem::take(&mut inner.rr_pending);
    for pid in pending {
        let memory_required = match inner.processes.get(&pid) {
            Some(p) => p.memory_required,
            None => continue,
        };
        match inner.allocator.allocate(pid, memory_required) {
            Ok(pages) => {
                if let Some(p) = inner.processes.get_mut(&pid) {
                    p.pages_allocated = pages;
                    p.status = ProcessStatus::Ready;
                }
                inner.rr_ready.push_back(pid);
            }
            Err(_) => inner.rr_pending.push_back(pid),
        }
    }
}

/// Runs one FCFS dispatch pass; returns the number of cores that executed an
/// instruction this pass.
fn fcfs_pass(inner: &mut Inner) -> usize {
    let mut active = 0;
    for core_idx in 0..inner.num_cores {
        let core = CoreId::new(core_idx);
        let mut core_ran = false;

        if let Some(pid) = inner.core_assignment[core_idx] {
            core_ran |= step_process(inner, pid, core) > 0;
            if inner.core_assignment[core_idx].is_none() {
                inner.core_available[core_idx] = true;
            }
        }

        if inner.core_assignment[core_idx].is_none() {
            if let Some(pid) = next_fcfs_candidate(inner, core_idx) {
                dispatch_onto(inner, pid, core);
                core_ran |= step_process(inner, pid, core) > 0;
                if inner.core_assignment[core_idx].is_none() {
                    inner.core_available[core_idx] = true;
                }
            }
        }

        if core_ran {
            active += 1;
        }
    }
    active
}

fn next_fcfs_candidate(inner: &mut Inner, core_idx: usize) -> Option<ids::ProcessId> {
    if let Some(pid) = inner.fcfs_queues[core_idx].pop_front() {
        return Some(pid);
    }
    for other in 0..inner.num_cores {
        if other != core_idx {
            if let Some(pid) = inner.fcfs_queues[other].pop_front() {
                return Some(pid);
            }
        }
    }
    None
}

/// Runs one round-robin dispatch pass; returns the number of cores that
/// executed at least one instruction this pass.
fn rr_pass(inner: &mut Inner) -> usize {
    for core_idx in 0..inner.num_cores {
        if inner.core_assignment[core_idx].is_none() {
            if let Some(pid) = inner.rr_ready.pop_front() {
                dispatch_onto(inner, pid, CoreId::new(core_idx));
            }
        }
    }

    let mut active = 0;
    for core_idx in 0..inner.num_cores {
        let Some(pid) = inner.core_assignment[core_idx] else {
            continue;
        };
        let core = CoreId::new(core_idx);
        let quantum = inner.quantum;
        let mut ran_any = false;

        for _ in 0..quantum {
            let outcome = step_process(inner, pid, core);
            if outcome > 0 {
                ran_any = true;
            }
            if inner.core_assignment[core_idx].is_none() {
                break; // terminated or slept mid-slice
            }
        }
        if ran_any {
            active += 1;
        }

        if let Some(still_assigned) = inner.core_assignment[core_idx] {
            debug_assert_eq!(still_assigned, pid);
            if let Some(p) = inner.processes.get_mut(&pid) {
                p.status = ProcessStatus::Ready;
                p.core = None;
            }
            inner.rr_ready.push_back(pid);
            inner.core_assignment[core_idx] = None;
            inner.core_available[core_idx] = true;
        }
    }
    active
}

fn dispatch_onto(inner: &mut Inner, pid: ids::ProcessId, core: CoreId) {
    inner.core_assignment[core.get()] = Some(pid);
    inner.core_available[core.get()] = false;
    if let Some(p) = inner.processes.get_mut(&pid) {
        p.status = ProcessStatus::Running;
        p.core = Some(core);
        log::debug!("dispatched process {} onto core {}", pid, core);
    }
}

/// Executes one instruction for `pid` on `core`; returns 1 if an instruction
/// actually ran, 0 otherwise. Handles termination and sleep bookkeeping,
/// including freeing the core.
fn step_process(inner: &mut Inner, pid: ids::ProcessId, core: CoreId) -> usize {
    let now = inner.sim_tick;
    let delay = inner.delay;

    let outcome = {
        let Some(process) = inner.processes.get_mut(&pid) else {
            inner.core_assignment[core.get()] = None;
            return 0;
        };
        execute_one(process, core, inner.allocator.as_mut(), now)
    };

    inner.sim_tick = inner.sim_tick.advance(1 + u64::from(delay));

    match outcome {
        StepOutcome::Continue => {}
        StepOutcome::Terminated(_) => {
            inner.core_assignment[core.get()] = None;
            inner.handle_termination(pid);
        }
        StepOutcome::Slept => {
            inner.core_assignment[core.get()] = None;
            if let Some(p) = inner.processes.get(&pid) {
                inner.sleeping.push(super::SleepingProcess {
                    pid,
                    wake_tick: p.wake_tick,
                    core,
                });
            }
        }
    }

    1
}
