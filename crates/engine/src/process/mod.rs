//! The `Process` entity and its immutable instruction program (spec §3).

mod parse;

pub use parse::{parse_program, ProgramParseError};

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local};
use ids::{CoreId, ProcessId};

use crate::interpreter::RuntimeFault;

/// One instruction in a process's program. Immutable after parse; carries
/// the original source-line index for diagnostics (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Print {
        message: String,
        line: usize,
    },
    Declare {
        var: String,
        value: u16,
        line: usize,
    },
    Add {
        dst: String,
        a: String,
        b: String,
        line: usize,
    },
    Subtract {
        dst: String,
        a: String,
        b: String,
        line: usize,
    },
    Sleep {
        ticks: u64,
        line: usize,
    },
    For {
        var: String,
        start: i64,
        end: i64,
        step: i64,
        line: usize,
    },
    EndFor {
        line: usize,
    },
    Write {
        addr: String,
        src: String,
        line: usize,
    },
    Read {
        dst: String,
        addr: String,
        line: usize,
    },
}

impl ParsedCommand {
    pub fn line(&self) -> usize {
        match self {
            ParsedCommand::Print { line, .. }
            | ParsedCommand::Declare { line, .. }
            | ParsedCommand::Add { line, .. }
            | ParsedCommand::Subtract { line, .. }
            | ParsedCommand::Sleep { line, .. }
            | ParsedCommand::For { line, .. }
            | ParsedCommand::EndFor { line }
            | ParsedCommand::Write { line, .. }
            | ParsedCommand::Read { line, .. } => *line,
        }
    }
}

/// Bookkeeping for one active `FOR` nesting level (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopContext {
    /// Index of the first instruction inside the loop body.
    pub start_command_index: usize,
    /// Index of the matching `END_FOR`.
    pub end_command_index: usize,
    pub var: String,
    pub current: i64,
    pub end: i64,
    pub step: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    New,
    Ready,
    Running,
    Paused,
    Terminated,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::New => "NEW",
            ProcessStatus::Ready => "READY",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Paused => "PAUSED",
            ProcessStatus::Terminated => "TERMINATED",
        };
        write!(f, "{s}")
    }
}

/// What a process's termination fault was, when it was terminated by the
/// interpreter instead of finishing its program (spec §7).
#[derive(Debug, Clone)]
pub struct FaultRecord {
    pub kind: RuntimeFault,
    pub at: DateTime<Local>,
}

pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub created_at: DateTime<Local>,
    pub program: Vec<ParsedCommand>,
    pub ip: usize,
    pub vars: HashMap<String, u16>,
    /// The process's own view of its address space. Ground truth for
    /// READ/WRITE correctness; independent of the paging simulation's
    /// frame-table/backing-store bookkeeping (see SPEC_FULL.md §D).
    pub memory: HashMap<u32, u16>,
    pub log: Vec<String>,
    pub loop_stack: Vec<LoopContext>,
    pub status: ProcessStatus,
    pub core: Option<CoreId>,
    pub finish_time: Option<DateTime<Local>>,
    pub fault: Option<FaultRecord>,
    pub memory_required: u32,
    pub pages_allocated: usize,
    pub sleeping: bool,
    pub wake_tick: ids::Tick,
}

impl Process {
    pub fn new(
        id: ProcessId,
        name: String,
        program: Vec<ParsedCommand>,
        memory_required: u32,
        created_at: DateTime<Local>,
    ) -> Self {
        Self {
            id,
            name,
            created_at,
            program,
            ip: 0,
            vars: HashMap::new(),
            memory: HashMap::new(),
            log: Vec::new(),
            loop_stack: Vec::new(),
            status: ProcessStatus::New,
            core: None,
            finish_time: None,
            fault: None,
            memory_required,
            pages_allocated: 0,
            sleeping: false,
            wake_tick: ids::Tick::ZERO,
        }
    }

    pub fn total_instructions(&self) -> usize {
        self.program.len()
    }

    pub fn is_finished_program(&self) -> bool {
        self.ip >= self.program.len() && self.loop_stack.is_empty()
    }

    pub fn push_log(&mut self, line: String) {
        self.log.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_process_starts_new_with_empty_state() {
        let p = Process::new(ProcessId::new(0), "p1".into(), vec![], 64, Local::now());
        assert_eq!(p.status, ProcessStatus::New);
        assert_eq!(p.ip, 0);
        assert!(p.vars.is_empty());
    }

    #[test]
    fn is_finished_program_respects_open_loop_stack() {
        let mut p = Process::new(ProcessId::new(0), "p1".into(), vec![], 64, Local::now());
        p.ip = 0;
        assert!(p.is_finished_program());
        p.loop_stack.push(LoopContext {
            start_command_index: 0,
            end_command_index: 0,
            var: "i".into(),
            current: 0,
            end: 0,
            step: 0,
        });
        assert!(!p.is_finished_program());
    }
}
