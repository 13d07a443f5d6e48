//! Text rendering for the console commands (spec §6). No ANSI colors.

use std::fmt::Write as _;

use engine::facade::{MemoryStats, ProcessDetail, ProcessSummary, System};
use engine::interpreter::RuntimeFault;

/// Three sections, per SPEC_FULL.md §C: scheduler summary, one merged
/// "active" table (running + ready + RR-pending, matching
/// `MainConsole.cpp`'s merge of the pending copy into `activeProcesses`
/// before printing), and the finished table.
pub fn render_screen_ls(system: &System) -> String {
    let mut out = String::new();
    let sched = system.scheduler();
    let _ = writeln!(out, "CPU utilization: {:.0}%", sched.cpu_utilization() * 100.0);
    let _ = writeln!(out, "Cores used: {}", sched.used_cores());
    let _ = writeln!(out, "Cores available: {}", sched.available_cores());
    out.push('\n');

    let mut active = system.list_active();
    active.extend(system.list_pending());
    active.sort_by_key(|p| p.created_at);
    out.push_str("Running processes:\n");
    for p in &active {
        let _ = writeln!(out, "{}", render_summary_line(p));
    }

    let mut finished = system.list_finished();
    finished.sort_by_key(|p| p.finish_time);
    out.push_str("\nFinished processes:\n");
    for p in &finished {
        let _ = writeln!(out, "{}", render_summary_line(p));
    }
    out
}

fn render_summary_line(p: &ProcessSummary) -> String {
    let core = p.core.map(|c| c.get().to_string()).unwrap_or_else(|| "-".to_string());
    let finished = p
        .finish_time
        .map(|t| t.format("%m/%d/%Y, %I:%M:%S %p").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<12} ({})  core {}  {}/{}  status {}  finished {}",
        p.name,
        p.created_at.format("%m/%d/%Y, %I:%M:%S %p"),
        core,
        p.current_line,
        p.total_lines,
        p.status,
        finished,
    )
}

/// `screen -r <name>`: renders the attached process's log, or the
/// synthesized memory-violation message if it was killed by a fault
/// (spec §7).
pub fn attach(system: &System, name: &str) {
    match system.get_process(name) {
        None => println!("process `{name}` not found"),
        Some(detail) => print!("{}", render_process_attach(&detail)),
    }
}

pub fn render_process_attach(detail: &ProcessDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "process name: {}", detail.summary.name);
    let _ = writeln!(out, "status: {}", detail.summary.status);
    let _ = writeln!(
        out,
        "instruction line: {} / {}",
        detail.summary.current_line, detail.summary.total_lines
    );
    let _ = writeln!(
        out,
        "memory: {} bytes, {} pages allocated, {} resident",
        detail.memory_required, detail.pages_allocated, detail.pages_resident
    );
    out.push('\n');
    for line in &detail.log {
        let _ = writeln!(out, "{line}");
    }
    if let Some((kind, at)) = &detail.fault {
        let message = match kind {
            RuntimeFault::MemoryAccessViolation { addr } => format!(
                "Process {} shut down due to memory access violation error that occurred at {}. 0x{:X} invalid.",
                detail.summary.name,
                at.format("%H:%M:%S"),
                addr
            ),
            RuntimeFault::MalformedForLoop => format!(
                "Process {} shut down due to a malformed FOR loop that occurred at {}.",
                detail.summary.name,
                at.format("%H:%M:%S")
            ),
        };
        out.push('\n');
        out.push_str(&message);
        out.push('\n');
    }
    out
}

pub fn render_vmstat(system: &System) -> String {
    render_vmstat_stats(&system.memory_stats())
}

fn render_vmstat_stats(stats: &MemoryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>12} total memory", stats.total_bytes);
    let _ = writeln!(out, "{:>12} used memory", stats.used_bytes);
    let _ = writeln!(out, "{:>12} free memory", stats.free_bytes);
    let _ = writeln!(out, "{:>12} idle cpu ticks", stats.idle_cpu_ticks);
    let _ = writeln!(out, "{:>12} active cpu ticks", stats.active_cpu_ticks);
    let _ = writeln!(out, "{:>12} total cpu ticks", stats.total_cpu_ticks);
    let _ = writeln!(out, "{:>12} pages paged in", stats.pages_paged_in);
    let _ = writeln!(out, "{:>12} pages paged out", stats.pages_paged_out);
    out
}

pub fn render_process_smi(system: &System) -> String {
    let stats = system.memory_stats();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Memory usage: {}/{} bytes",
        stats.used_bytes, stats.total_bytes
    );
    let _ = writeln!(
        out,
        "CPU utilization: {:.0}%",
        system.scheduler().cpu_utilization() * 100.0
    );
    out.push('\n');
    out.push_str("Running processes and memory usage:\n");
    let mut active = system.list_active();
    active.sort_by_key(|p| p.name.clone());
    for p in &active {
        if let Some(detail) = system.get_process(&p.name) {
            let _ = writeln!(out, "{:<12} {} bytes", p.name, detail.memory_required);
        }
    }
    out
}

/// `backing-store` (spec §6): the first 20 stored-page records.
pub fn render_backing_store(system: &System) -> String {
    let mut records = system.backing_store_records();
    records.sort_by_key(|(pid, page, _)| (*pid, *page));
    let mut out = String::new();
    let _ = writeln!(out, "{} page(s) in the backing store (showing up to 20):", records.len());
    for (pid, page, bytes) in records.iter().take(20) {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let _ = writeln!(out, "pid {pid} page {page}: {hex}");
    }
    out
}
