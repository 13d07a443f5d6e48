//! The simulator engine: process model, instruction interpreter,
//! demand-paging memory allocator, multi-core scheduler, batch generator,
//! and the console-facing facade that wires them together.

pub mod batch;
pub mod facade;
pub mod interpreter;
pub mod memory;
pub mod process;
pub mod randgen;
pub mod scheduler;

pub use facade::{CreateProcessError, MemoryStats, ProcessDetail, ProcessSummary, System};
pub use scheduler::{Scheduler, SchedulerError};
