//! Parses and executes the fixed CLI surface (spec §6).

use std::path::PathBuf;

use config::Config;
use engine::facade::System;
use thiserror::Error;

use crate::{report, view};

pub const BACKING_STORE_PATH: &str = "csopesy-backing-store.txt";
pub const CONFIG_PATH: &str = "config.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Noop,
    Initialize,
    ScreenStart { name: String, mem: Option<u32> },
    ScreenCustom { name: String, mem: Option<u32>, body: String },
    ScreenResume(String),
    ScreenList,
    SchedulerStart,
    SchedulerStop,
    ReportUtil,
    Vmstat,
    ProcessSmi,
    BackingStore,
    Exit,
}

/// Why a typed line couldn't be turned into a `Command` (spec §6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command: `{0}`")]
    UnknownKeyword(String),
    #[error("unrecognized `screen` flag: `{0}`")]
    UnknownScreenFlag(String),
    #[error("`screen -c` requires a quoted instruction body: `{0}`")]
    MissingCustomBody(String),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "" => Ok(Command::Noop),
        "initialize" => Ok(Command::Initialize),
        "exit" => Ok(Command::Exit),
        "scheduler-start" => Ok(Command::SchedulerStart),
        "scheduler-stop" => Ok(Command::SchedulerStop),
        "report-util" => Ok(Command::ReportUtil),
        "vmstat" => Ok(Command::Vmstat),
        "process-smi" => Ok(Command::ProcessSmi),
        "backing-store" => Ok(Command::BackingStore),
        "screen" => parse_screen(rest),
        other => Err(CommandError::UnknownKeyword(other.to_string())),
    }
}

fn parse_screen(rest: &str) -> Result<Command, CommandError> {
    if rest == "-ls" {
        return Ok(Command::ScreenList);
    }
    if let Some(name) = rest.strip_prefix("-r ") {
        return Ok(Command::ScreenResume(name.trim().to_string()));
    }
    if let Some(after) = rest.strip_prefix("-s ") {
        let (name, mem) = parse_name_and_mem(after.trim());
        return Ok(Command::ScreenStart { name, mem });
    }
    if let Some(after) = rest.strip_prefix("-c ") {
        return parse_screen_custom(after.trim());
    }
    Err(CommandError::UnknownScreenFlag(rest.to_string()))
}

fn parse_name_and_mem(s: &str) -> (String, Option<u32>) {
    let mut tokens = s.split_whitespace();
    let name = tokens.next().unwrap_or("").to_string();
    let mem = tokens.next().and_then(|t| t.parse().ok());
    (name, mem)
}

fn parse_screen_custom(s: &str) -> Result<Command, CommandError> {
    let Some(quote_start) = s.find('"') else {
        return Err(CommandError::MissingCustomBody(s.to_string()));
    };
    let head = s[..quote_start].trim();
    let after_quote = &s[quote_start + 1..];
    let Some(quote_end) = after_quote.rfind('"') else {
        return Err(CommandError::MissingCustomBody(s.to_string()));
    };
    let body = after_quote[..quote_end].to_string();
    let (name, mem) = parse_name_and_mem(head);
    Ok(Command::ScreenCustom { name, mem, body })
}

/// Runs one command against the (possibly uninitialized) system state.
pub fn execute(cmd: Command, system: &mut Option<System>) -> ControlFlow {
    match cmd {
        Command::Noop => {}
        Command::Initialize => {
            if system.is_some() {
                println!("system already initialized");
                return ControlFlow::Continue;
            }
            match Config::from_file(CONFIG_PATH) {
                Ok(config) => match System::initialize(config, PathBuf::from(BACKING_STORE_PATH)) {
                    Ok(new_system) => {
                        log::info!("system initialized from {CONFIG_PATH}");
                        *system = Some(new_system);
                    }
                    Err(err) => println!("failed to initialize backing store: {err}"),
                },
                Err(err) => println!("failed to read {CONFIG_PATH}: {err}"),
            }
        }
        Command::ScreenStart { name, mem } => with_system(system, |s| {
            match s.create_process(&name, mem) {
                Ok(pid) => println!("created process {name} (id {pid})"),
                Err(err) => println!("could not create {name}: {err}"),
            }
        }),
        Command::ScreenCustom { name, mem, body } => with_system(system, |s| {
            match s.create_custom_process(&name, &body, mem) {
                Ok(pid) => println!("created process {name} (id {pid})"),
                Err(err) => println!("could not create {name}: {err}"),
            }
        }),
        Command::ScreenResume(name) => with_system(system, |s| view::attach(s, &name)),
        Command::ScreenList => with_system(system, |s| print!("{}", view::render_screen_ls(s))),
        Command::SchedulerStart => with_system(system, |s| match s.start_scheduler() {
            Ok(()) => println!("scheduler started"),
            Err(err) => println!("scheduler not started: {err}"),
        }),
        Command::SchedulerStop => with_system(system, |s| {
            s.stop_scheduler();
            println!("batch generation stopped");
        }),
        Command::ReportUtil => with_system(system, |s| match report::write_report(s) {
            Ok(path) => println!("report written to {}", path.display()),
            Err(err) => println!("failed to write report: {err}"),
        }),
        Command::Vmstat => with_system(system, |s| print!("{}", view::render_vmstat(s))),
        Command::ProcessSmi => with_system(system, |s| print!("{}", view::render_process_smi(s))),
        Command::BackingStore => with_system(system, |s| print!("{}", view::render_backing_store(s))),
        Command::Exit => {
            if let Some(s) = system.as_ref() {
                s.shutdown();
            }
            println!("bye");
            return ControlFlow::Exit;
        }
    }
    ControlFlow::Continue
}

pub enum ControlFlow {
    Continue,
    Exit,
}

fn with_system(system: &mut Option<System>, f: impl FnOnce(&System)) {
    match system {
        Some(s) => f(s),
        None => println!("the system has not been initialized; run `initialize` first"),
    }
}
