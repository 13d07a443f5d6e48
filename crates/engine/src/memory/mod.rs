//! The demand-paging memory allocator (spec §4.3) behind a small trait that
//! also admits a non-paging implementation (spec §9, "Polymorphic
//! allocator").

mod backing_store;
mod demand_paging;
mod flat;

pub use backing_store::BackingStore;
pub use demand_paging::{DemandPagingAllocator, ReplacementPolicy};
pub use flat::FlatAllocator;

use ids::ProcessId;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("no free frames available to admit this process")]
    NoFreeFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit { frame: usize },
    Fault { frame: usize },
}

impl AccessOutcome {
    pub fn frame(self) -> usize {
        match self {
            AccessOutcome::Hit { frame } | AccessOutcome::Fault { frame } => frame,
        }
    }

    pub fn was_fault(self) -> bool {
        matches!(self, AccessOutcome::Fault { .. })
    }
}

/// Capability exposed by every memory-allocation strategy (spec §9).
pub trait MemoryAllocator: Send {
    fn frame_size(&self) -> u32;
    fn frame_count(&self) -> usize;
    fn free_frame_count(&self) -> usize;

    /// Admits a process, computing `pages_needed` from `memory_required` and
    /// claiming an initial resident set (spec §4.3).
    fn allocate(&mut self, pid: ProcessId, memory_required: u32) -> Result<usize, AdmissionError>;

    /// Releases every resident frame held by `pid` (spec §4.3).
    fn deallocate(&mut self, pid: ProcessId);

    /// Touches a page, servicing a page fault if it isn't resident
    /// (spec §4.3).
    fn access(&mut self, pid: ProcessId, page: u32) -> AccessOutcome;

    fn pages_resident(&self, pid: ProcessId) -> usize;

    fn pages_paged_in(&self) -> u64;
    fn pages_paged_out(&self) -> u64;

    /// Diagnostic dump of the backing store (spec §6, `backing-store`).
    /// Allocators with no backing store (e.g. `FlatAllocator`) return
    /// nothing.
    fn backing_store_records(&self) -> Vec<(ProcessId, u32, Vec<u8>)> {
        Vec::new()
    }
}

/// `ceil(memory_required / frame_size)`, used by every allocator (spec §4.3).
pub fn pages_needed(memory_required: u32, frame_size: u32) -> usize {
    (memory_required as usize).div_ceil(frame_size as usize)
}

/// Deterministic filler bytes for a page that has never been written by the
/// process but must still occupy a backing-store record (spec §4.3).
pub fn placeholder_bytes(pid: ProcessId, page: u32, frame_size: u32) -> Vec<u8> {
    let seed = (pid.get() as u8).wrapping_add(page as u8);
    (0..frame_size).map(|i| seed.wrapping_add(i as u8)).collect()
}
