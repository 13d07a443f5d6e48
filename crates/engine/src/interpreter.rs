//! One-step execution of a `ParsedCommand` against a `Process` (spec §4.2).

use chrono::Local;
use ids::{CoreId, Tick};
use thiserror::Error;

use crate::memory::MemoryAllocator;
use crate::process::{FaultRecord, LoopContext, ParsedCommand, Process, ProcessStatus};

/// Why the interpreter forced a process to `Terminated` instead of it
/// finishing its program (spec §7). Carried as `StepOutcome::Terminated`'s
/// payload and stored on the process as a `FaultRecord` for the facade to
/// turn into the §C violation message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeFault {
    #[error("memory access violation at 0x{addr:X}")]
    MemoryAccessViolation { addr: u32 },
    #[error("malformed FOR loop (unmatched END_FOR)")]
    MalformedForLoop,
}

/// Whether the process may keep occupying its core after this step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Slept,
    Terminated(Option<RuntimeFault>),
}

/// Executes exactly one instruction. Always called holding the scheduler's
/// lock (spec §4.2: "the interpreter does no I/O and no blocking waits").
pub fn execute_one(
    process: &mut Process,
    core: CoreId,
    allocator: &mut dyn MemoryAllocator,
    now: Tick,
) -> StepOutcome {
    if process.is_finished_program() {
        return terminate(process);
    }

    let Some(cmd) = fetch(process) else {
        // Unmatched FOR discovered while locating its END_FOR (spec §7).
        return terminate_with_fault(process, RuntimeFault::MalformedForLoop);
    };

    match cmd {
        ParsedCommand::Print { message, .. } => {
            let text = render_print(process, &message);
            process.push_log(format!("({}) Core:{} PRINT {}", now, core, text));
            StepOutcome::Continue
        }
        ParsedCommand::Declare { var, value, .. } => {
            process.vars.insert(var.clone(), value);
            process.push_log(format!("({}) Core:{} DECLARE {} = {}", now, core, var, value));
            StepOutcome::Continue
        }
        ParsedCommand::Add { dst, a, b, .. } => {
            let va = resolve_operand(process, &a);
            let vb = resolve_operand(process, &b);
            let result = va.wrapping_add(vb);
            process.vars.insert(dst.clone(), result);
            process.push_log(format!(
                "({}) Core:{} ADD {} = {} + {} = {}",
                now, core, dst, va, vb, result
            ));
            StepOutcome::Continue
        }
        ParsedCommand::Subtract { dst, a, b, .. } => {
            let va = resolve_operand(process, &a);
            let vb = resolve_operand(process, &b);
            let result = va.wrapping_sub(vb);
            process.vars.insert(dst.clone(), result);
            process.push_log(format!(
                "({}) Core:{} SUBTRACT {} = {} - {} = {}",
                now, core, dst, va, vb, result
            ));
            StepOutcome::Continue
        }
        ParsedCommand::Sleep { ticks, .. } => {
            process.status = ProcessStatus::Paused;
            process.sleeping = true;
            process.wake_tick = now.advance(ticks);
            process.push_log(format!("({}) Core:{} SLEEP {}", now, core, ticks));
            StepOutcome::Slept
        }
        ParsedCommand::For { .. } | ParsedCommand::EndFor { .. } => {
            // Control instructions were already actioned by `fetch`; they
            // still cost a tick and a log line like any other instruction.
            process.push_log(format!("({}) Core:{} LOOP", now, core));
            StepOutcome::Continue
        }
        ParsedCommand::Write { addr, src, .. } => {
            let address = resolve_address_operand(process, &addr);
            let value = resolve_operand(process, &src);
            match check_bounds(process, allocator, address) {
                Ok(page) => {
                    allocator.access(process.id, page);
                    process.memory.insert(address, value);
                    process.push_log(format!(
                        "({}) Core:{} WRITE 0x{:X} = {}",
                        now, core, address, value
                    ));
                    StepOutcome::Continue
                }
                Err(()) => terminate_with_fault(process, RuntimeFault::MemoryAccessViolation { addr: address }),
            }
        }
        ParsedCommand::Read { dst, addr, .. } => {
            let address = resolve_address_operand(process, &addr);
            match check_bounds(process, allocator, address) {
                Ok(page) => {
                    allocator.access(process.id, page);
                    let value = *process.memory.get(&address).unwrap_or(&0);
                    process.vars.insert(dst.clone(), value);
                    process.push_log(format!(
                        "({}) Core:{} READ {} = 0x{:X} -> {}",
                        now, core, dst, address, value
                    ));
                    StepOutcome::Continue
                }
                Err(()) => terminate_with_fault(process, RuntimeFault::MemoryAccessViolation { addr: address }),
            }
        }
    }
}

fn terminate(process: &mut Process) -> StepOutcome {
    process.status = ProcessStatus::Terminated;
    process.finish_time = Some(Local::now());
    process.core = None;
    StepOutcome::Terminated(None)
}

fn terminate_with_fault(process: &mut Process, fault: RuntimeFault) -> StepOutcome {
    let at = Local::now();
    process.push_log(format!("FAULT {fault}"));
    process.fault = Some(FaultRecord { kind: fault.clone(), at });
    process.status = ProcessStatus::Terminated;
    process.finish_time = Some(at);
    process.core = None;
    StepOutcome::Terminated(Some(fault))
}

/// Checks a WRITE/READ address against the process's declared memory and
/// its allocated page count (spec §7). Returns the page number on success.
fn check_bounds(process: &Process, allocator: &dyn MemoryAllocator, addr: u32) -> Result<u32, ()> {
    if addr >= process.memory_required {
        return Err(());
    }
    let page = addr / allocator.frame_size();
    if page as usize >= process.pages_allocated {
        return Err(());
    }
    Ok(page)
}

/// Resolves an ADD/SUBTRACT/WRITE-source operand: a declared variable, a
/// numeric literal, or an implicit zero-declaration (spec §9, preserved
/// behavior; logged per the design note there).
fn resolve_operand(process: &mut Process, operand: &str) -> u16 {
    if let Some(&v) = process.vars.get(operand) {
        return v;
    }
    if let Ok(n) = operand.parse::<i64>() {
        return n.rem_euclid(1 << 16) as u16;
    }
    log::debug!(
        "process {} implicitly declared `{}` to 0",
        process.id,
        operand
    );
    process.vars.insert(operand.to_string(), 0);
    0
}

/// Like `resolve_operand` but widened to a 32-bit address (spec §3: memory
/// addresses are 32-bit while the register file is 16-bit).
fn resolve_address_operand(process: &mut Process, operand: &str) -> u32 {
    if let Some(&v) = process.vars.get(operand) {
        return v as u32;
    }
    if let Ok(n) = operand.parse::<u32>() {
        return n;
    }
    log::debug!(
        "process {} implicitly declared `{}` to 0",
        process.id,
        operand
    );
    process.vars.insert(operand.to_string(), 0);
    0
}

fn render_print(process: &mut Process, spec: &str) -> String {
    spec.split('+')
        .map(|piece| {
            let piece = piece.trim();
            if piece.len() >= 2 && piece.starts_with('"') && piece.ends_with('"') {
                piece[1..piece.len() - 1].to_string()
            } else {
                resolve_operand(process, piece).to_string()
            }
        })
        .collect()
}

/// Fetches the next instruction, actioning `FOR`/`END_FOR` control flow
/// (spec §4.2). Returns `None` if a `FOR` has no matching `END_FOR`.
fn fetch(process: &mut Process) -> Option<ParsedCommand> {
    if let Some(ctx) = process.loop_stack.last() {
        if process.ip == ctx.end_command_index {
            return step_loop(process);
        }
    }

    let cmd = process.program[process.ip].clone();
    process.ip += 1;

    if matches!(cmd, ParsedCommand::EndFor { .. }) {
        // Any END_FOR reached outside of `step_loop` has no governing FOR
        // context currently tracking it as its exit point (spec §4.2).
        log::warn!(
            "process {} hit a bare END_FOR with no active loop context",
            process.id
        );
    }

    if let ParsedCommand::For {
        var,
        start,
        end,
        step,
        ..
    } = &cmd
    {
        let (var, start, end, step) = (var.clone(), *start, *end, *step);
        let enter = predicate_holds(start, end, step);
        let end_index = match find_matching_end_for(&process.program, process.ip - 1) {
            Some(i) => i,
            None => return None,
        };
        if enter {
            process.vars.insert(var.clone(), (start as i64).rem_euclid(1 << 16) as u16);
            process.loop_stack.push(LoopContext {
                start_command_index: process.ip,
                end_command_index: end_index,
                var,
                current: start,
                end,
                step,
            });
        } else {
            process.ip = end_index + 1;
        }
    }

    Some(cmd)
}

/// The pointer has reached the innermost loop's `END_FOR`: step, and either
/// loop back or pop the context (spec §4.2).
fn step_loop(process: &mut Process) -> Option<ParsedCommand> {
    let cmd = process.program[process.ip].clone();

    let ctx = process.loop_stack.last_mut().expect("checked by caller");
    ctx.current += ctx.step;
    // A zero step never moves `current`, so re-applying the entry predicate
    // would loop forever whenever it entered at all; a zero-step loop body
    // always runs exactly once.
    let continues = ctx.step != 0 && predicate_holds(ctx.current, ctx.end, ctx.step);
    let var = ctx.var.clone();
    let current = ctx.current;
    let start_index = ctx.start_command_index;

    if continues {
        process.vars.insert(var, (current as i64).rem_euclid(1 << 16) as u16);
        process.ip = start_index;
    } else {
        process.loop_stack.pop();
        process.ip += 1;
    }

    Some(cmd)
}

fn predicate_holds(current: i64, end: i64, step: i64) -> bool {
    match step.cmp(&0) {
        std::cmp::Ordering::Greater => current <= end,
        std::cmp::Ordering::Less => current >= end,
        std::cmp::Ordering::Equal => current == end,
    }
}

/// Linear scan counting `FOR`/`END_FOR` depth to find the `END_FOR` matching
/// the `FOR` at `for_index` (spec §4.2).
fn find_matching_end_for(program: &[ParsedCommand], for_index: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, cmd) in program.iter().enumerate().skip(for_index + 1) {
        match cmd {
            ParsedCommand::For { .. } => depth += 1,
            ParsedCommand::EndFor { .. } => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}
