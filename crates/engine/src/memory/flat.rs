//! A non-paging allocator: a process's whole memory demand is resident or
//! nothing is (spec §9, "Polymorphic allocator" — kept as the trait's second
//! citizen, not wired into the default facade).

use std::collections::HashMap;

use ids::ProcessId;

use super::{AccessOutcome, AdmissionError, MemoryAllocator};

pub struct FlatAllocator {
    total_bytes: u32,
    used: HashMap<ProcessId, u32>,
}

impl FlatAllocator {
    pub fn new(total_bytes: u32) -> Self {
        Self {
            total_bytes,
            used: HashMap::new(),
        }
    }

    fn used_bytes(&self) -> u32 {
        self.used.values().sum()
    }
}

impl MemoryAllocator for FlatAllocator {
    fn frame_size(&self) -> u32 {
        self.total_bytes
    }

    fn frame_count(&self) -> usize {
        1
    }

    fn free_frame_count(&self) -> usize {
        if self.used.is_empty() {
            1
        } else {
            0
        }
    }

    fn allocate(&mut self, pid: ProcessId, memory_required: u32) -> Result<usize, AdmissionError> {
        if self.used_bytes() + memory_required > self.total_bytes {
            return Err(AdmissionError::NoFreeFrames);
        }
        self.used.insert(pid, memory_required);
        Ok(1)
    }

    fn deallocate(&mut self, pid: ProcessId) {
        self.used.remove(&pid);
    }

    fn access(&mut self, _pid: ProcessId, _page: u32) -> AccessOutcome {
        AccessOutcome::Hit { frame: 0 }
    }

    fn pages_resident(&self, pid: ProcessId) -> usize {
        usize::from(self.used.contains_key(&pid))
    }

    fn pages_paged_in(&self) -> u64 {
        0
    }

    fn pages_paged_out(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_processes_until_capacity_is_exhausted() {
        let mut alloc = FlatAllocator::new(64);
        assert!(alloc.allocate(ProcessId::new(0), 40).is_ok());
        assert_eq!(
            alloc.allocate(ProcessId::new(1), 40),
            Err(AdmissionError::NoFreeFrames)
        );
    }

    #[test]
    fn deallocate_frees_capacity() {
        let mut alloc = FlatAllocator::new(64);
        let pid = ProcessId::new(0);
        alloc.allocate(pid, 64).unwrap();
        alloc.deallocate(pid);
        assert!(alloc.allocate(ProcessId::new(1), 64).is_ok());
    }
}
