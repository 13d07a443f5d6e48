//! Demand-paging allocator: frame table, FIFO/LRU replacement, admission
//! control (spec §4.3).

use std::collections::{HashMap, VecDeque};

use ids::ProcessId;
use lru::LruCache;

use super::{pages_needed, placeholder_bytes, AccessOutcome, AdmissionError, BackingStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    Fifo,
    Lru,
}

type FrameSlot = Option<(ProcessId, u32)>;

pub struct DemandPagingAllocator {
    frame_size: u32,
    frames: Vec<FrameSlot>,
    free: VecDeque<usize>,
    page_tables: HashMap<ProcessId, HashMap<u32, usize>>,
    fifo: VecDeque<(ProcessId, u32)>,
    lru: LruCache<(ProcessId, u32), ()>,
    policy: ReplacementPolicy,
    backing: BackingStore,
    pages_paged_in: u64,
    pages_paged_out: u64,
}

impl DemandPagingAllocator {
    pub fn new(frame_count: usize, frame_size: u32, policy: ReplacementPolicy, backing: BackingStore) -> Self {
        Self {
            frame_size,
            frames: vec![None; frame_count],
            free: (0..frame_count).collect(),
            page_tables: HashMap::new(),
            fifo: VecDeque::new(),
            lru: LruCache::unbounded(),
            policy,
            backing,
            pages_paged_in: 0,
            pages_paged_out: 0,
        }
    }

    pub fn backing_store(&self) -> &BackingStore {
        &self.backing
    }

    /// Count of pages in `pid`'s page table that are known (allocated) but
    /// not resident, capped by `pages_allocated` (spec §4.3, "Statistics").
    pub fn pages_allocated_not_resident(&self, pid: ProcessId, pages_allocated: usize) -> usize {
        let resident = self.pages_resident(pid);
        pages_allocated.saturating_sub(resident)
    }

    fn pick_victim(&mut self) -> (ProcessId, u32) {
        match self.policy {
            ReplacementPolicy::Fifo => self
                .fifo
                .pop_front()
                .expect("replacement only runs when some frame is resident"),
            ReplacementPolicy::Lru => self
                .lru
                .pop_lru()
                .map(|(k, _)| k)
                .expect("replacement only runs when some frame is resident"),
        }
    }

    fn evict(&mut self, victim: (ProcessId, u32)) -> usize {
        let (pid, page) = victim;
        let frame = self
            .page_tables
            .get_mut(&pid)
            .and_then(|t| t.remove(&page))
            .expect("victim must currently be resident");

        // The page's content is whatever it was the last time it was paged
        // in (or the placeholder from initial allocation); the paging
        // simulation never mutates page-level bytes while resident, so the
        // write-back is the read-back verbatim.
        let bytes = self.backing.read_page(pid, page);
        self.backing.write_page(pid, page, &bytes);
        self.pages_paged_out += 1;

        self.frames[frame] = None;
        self.free.push_back(frame);
        frame
    }

    fn install(&mut self, pid: ProcessId, page: u32, frame: usize) {
        self.frames[frame] = Some((pid, page));
        self.page_tables.entry(pid).or_default().insert(page, frame);
        match self.policy {
            ReplacementPolicy::Fifo => self.fifo.push_back((pid, page)),
            ReplacementPolicy::Lru => {
                self.lru.put((pid, page), ());
            }
        }
    }

    fn touch_hit(&mut self, pid: ProcessId, page: u32) {
        if self.policy == ReplacementPolicy::Lru {
            // `get` has the side effect of moving the entry to the
            // most-recently-used end; we only want that side effect.
            let _ = self.lru.get(&(pid, page));
        }
    }
}

impl super::MemoryAllocator for DemandPagingAllocator {
    fn frame_size(&self) -> u32 {
        self.frame_size
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn free_frame_count(&self) -> usize {
        self.free.len()
    }

    fn allocate(&mut self, pid: ProcessId, memory_required: u32) -> Result<usize, AdmissionError> {
        let needed = pages_needed(memory_required, self.frame_size);
        let initial_resident = needed.min(1);

        if self.free.len() < initial_resident {
            return Err(AdmissionError::NoFreeFrames);
        }

        for page in 0..initial_resident {
            let frame = self.free.pop_front().unwrap();
            self.install(pid, page as u32, frame);
        }

        for page in initial_resident..needed {
            let bytes = placeholder_bytes(pid, page as u32, self.frame_size);
            self.backing.write_page(pid, page as u32, &bytes);
            self.pages_paged_out += 1;
        }

        self.page_tables.entry(pid).or_default();
        Ok(needed)
    }

    fn deallocate(&mut self, pid: ProcessId) {
        if let Some(table) = self.page_tables.remove(&pid) {
            for (_, frame) in table {
                self.frames[frame] = None;
                self.free.push_back(frame);
            }
        }
        self.fifo.retain(|&(p, _)| p != pid);
        // LruCache has no bulk filter; resident keys were already removed
        // above, so any surviving entries for `pid` are stale and must go.
        let stale: Vec<_> = self
            .lru
            .iter()
            .filter(|((p, _), _)| *p == pid)
            .map(|(&k, _)| k)
            .collect();
        for key in stale {
            self.lru.pop(&key);
        }
        self.backing.purge(pid);
    }

    fn access(&mut self, pid: ProcessId, page: u32) -> AccessOutcome {
        if let Some(&frame) = self.page_tables.get(&pid).and_then(|t| t.get(&page)) {
            self.touch_hit(pid, page);
            return AccessOutcome::Hit { frame };
        }

        let frame = if let Some(f) = self.free.pop_front() {
            f
        } else {
            let victim = self.pick_victim();
            self.evict(victim)
        };

        let _ = self.backing.read_page(pid, page);
        self.pages_paged_in += 1;
        self.install(pid, page, frame);
        AccessOutcome::Fault { frame }
    }

    fn pages_resident(&self, pid: ProcessId) -> usize {
        self.page_tables.get(&pid).map_or(0, |t| t.len())
    }

    fn pages_paged_in(&self) -> u64 {
        self.pages_paged_in
    }

    fn pages_paged_out(&self) -> u64 {
        self.pages_paged_out
    }

    fn backing_store_records(&self) -> Vec<(ProcessId, u32, Vec<u8>)> {
        self.backing.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAllocator;

    fn allocator(frames: usize, frame_size: u32, policy: ReplacementPolicy) -> DemandPagingAllocator {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        let backing = BackingStore::new(path, frame_size).unwrap();
        DemandPagingAllocator::new(frames, frame_size, policy, backing)
    }

    #[test]
    fn allocate_with_sub_frame_memory_claims_one_page() {
        let mut alloc = allocator(4, 16, ReplacementPolicy::Fifo);
        let pid = ProcessId::new(0);
        let needed = alloc.allocate(pid, 10).unwrap();
        assert_eq!(needed, 1);
        assert_eq!(alloc.pages_resident(pid), 1);
        assert_eq!(alloc.free_frame_count(), 3);
    }

    #[test]
    fn allocate_writes_placeholders_for_non_resident_pages() {
        let mut alloc = allocator(4, 16, ReplacementPolicy::Fifo);
        let pid = ProcessId::new(0);
        alloc.allocate(pid, 48).unwrap(); // 3 pages needed, 1 resident
        assert_eq!(alloc.pages_paged_out(), 2);
    }

    #[test]
    fn admission_fails_when_no_frames_free() {
        let mut alloc = allocator(1, 16, ReplacementPolicy::Fifo);
        alloc.allocate(ProcessId::new(0), 16).unwrap();
        let err = alloc.allocate(ProcessId::new(1), 16).unwrap_err();
        assert_eq!(err, AdmissionError::NoFreeFrames);
    }

    #[test]
    fn fault_evicts_fifo_oldest_resident() {
        let mut alloc = allocator(1, 16, ReplacementPolicy::Fifo);
        let p0 = ProcessId::new(0);
        alloc.allocate(p0, 16).unwrap(); // page 0 resident in the only frame
        let p1 = ProcessId::new(1);
        alloc.allocate(p1, 16).unwrap_err(); // no free frame for p1 directly

        // accessing a second page for p0 must evict p0's own page 0 (only
        // resident page) since it is the sole frame.
        let outcome = alloc.access(p0, 1);
        assert!(outcome.was_fault());
        assert_eq!(alloc.pages_resident(p0), 1);
        assert_eq!(alloc.pages_paged_out(), 1);
    }

    #[test]
    fn lru_evicts_least_recently_touched() {
        let mut alloc = allocator(2, 16, ReplacementPolicy::Lru);
        let pid = ProcessId::new(0);
        alloc.allocate(pid, 80).unwrap(); // 5 pages needed, page 0 resident
        alloc.access(pid, 1); // frame 1 now resident: [0,1]
        alloc.access(pid, 0); // touch page 0: LRU order becomes [1,0]
        alloc.access(pid, 2); // no free frame -> evict page 1 (LRU)
        assert_eq!(alloc.pages_resident(pid), 2);
        // page 1 must have been evicted, not page 0.
        assert!(alloc.page_tables.get(&pid).unwrap().contains_key(&0));
        assert!(!alloc.page_tables.get(&pid).unwrap().contains_key(&1));
    }

    #[test]
    fn deallocate_frees_all_frames_and_is_idempotent() {
        let mut alloc = allocator(4, 16, ReplacementPolicy::Fifo);
        let pid = ProcessId::new(0);
        alloc.allocate(pid, 32).unwrap();
        alloc.access(pid, 1);
        assert_eq!(alloc.free_frame_count(), 2);
        alloc.deallocate(pid);
        assert_eq!(alloc.free_frame_count(), 4);
        assert_eq!(alloc.pages_resident(pid), 0);
        alloc.deallocate(pid); // idempotent
        assert_eq!(alloc.free_frame_count(), 4);
    }

    #[test]
    fn page_out_then_in_round_trips_bytes() {
        let mut alloc = allocator(1, 4, ReplacementPolicy::Fifo);
        let pid = ProcessId::new(7);
        alloc.allocate(pid, 4).unwrap();
        let before = alloc.backing_store().read_page(pid, 0);
        alloc.access(ProcessId::new(8), 0); // different pid forces eviction path
        // page 0's content, having been paged out, must read back unchanged.
        assert_eq!(alloc.backing_store().read_page(pid, 0), before);
    }
}
