//! The file-backed paging store (spec §4.4).
//!
//! An append-only, line-oriented text file: `<pid> <page> <hex bytes>`. A
//! later record for the same `(pid, page)` supersedes earlier ones. An
//! in-memory index accelerates lookup; the file remains authoritative and is
//! rebuilt from on restart.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use ids::ProcessId;

pub struct BackingStore {
    path: PathBuf,
    file: File,
    frame_size: u32,
    index: HashMap<(u64, u32), Vec<u8>>,
}

impl BackingStore {
    /// Truncates `path` and opens it for appending (spec §4.4: "At system
    /// init the file is truncated").
    pub fn new(path: impl AsRef<Path>, frame_size: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Truncate first, then reopen in append mode for subsequent writes.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            frame_size,
            index: HashMap::new(),
        })
    }

    /// Rebuilds the in-memory index from whatever records `path` already
    /// holds, without truncating it (used when resuming an existing store).
    pub fn open_existing(path: impl AsRef<Path>, frame_size: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = HashMap::new();
        if let Ok(f) = File::open(&path) {
            for line in BufReader::new(f).lines() {
                let line = line?;
                if let Some((pid, page, bytes)) = parse_record(&line) {
                    index.insert((pid, page), bytes);
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            frame_size,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a page-out record. Best-effort: an append failure is logged
    /// and otherwise ignored (spec §7, "I/O — backing store").
    pub fn write_page(&mut self, pid: ProcessId, page: u32, bytes: &[u8]) {
        let line = format!("{} {} {}\n", pid.get(), page, encode_hex(bytes));
        if let Err(err) = self.file.write_all(line.as_bytes()) {
            log::error!("backing store append failed for pid {pid} page {page}: {err}");
        }
        self.index.insert((pid.get(), page), bytes.to_vec());
    }

    /// Reads a page's bytes, or a zero-filled frame if it was never written.
    pub fn read_page(&self, pid: ProcessId, page: u32) -> Vec<u8> {
        self.index
            .get(&(pid.get(), page))
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.frame_size as usize])
    }

    pub fn purge(&mut self, pid: ProcessId) {
        self.index.retain(|&(p, _), _| p != pid.get());
    }

    /// Diagnostic enumeration of every record currently indexed (spec §4.4,
    /// used by the `backing-store` CLI command).
    pub fn records(&self) -> Vec<(ProcessId, u32, Vec<u8>)> {
        let mut out: Vec<_> = self
            .index
            .iter()
            .map(|(&(pid, page), bytes)| (ProcessId::new(pid), page, bytes.clone()))
            .collect();
        out.sort_by_key(|(pid, page, _)| (pid.get(), *page));
        out
    }
}

fn parse_record(line: &str) -> Option<(u64, u32, Vec<u8>)> {
    let mut parts = line.split_whitespace();
    let pid: u64 = parts.next()?.parse().ok()?;
    let page: u32 = parts.next()?.parse().ok()?;
    let hex = parts.next()?;
    Some((pid, page, decode_hex(hex)?))
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        let mut store = BackingStore::new(&path, 16).unwrap();
        let pid = ProcessId::new(3);
        let bytes: Vec<u8> = (0..16).collect();
        store.write_page(pid, 2, &bytes);
        assert_eq!(store.read_page(pid, 2), bytes);
    }

    #[test]
    fn unwritten_page_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        let store = BackingStore::new(&path, 16).unwrap();
        assert_eq!(store.read_page(ProcessId::new(0), 0), vec![0u8; 16]);
    }

    #[test]
    fn later_write_supersedes_earlier_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        let mut store = BackingStore::new(&path, 4).unwrap();
        let pid = ProcessId::new(1);
        store.write_page(pid, 0, &[1, 1, 1, 1]);
        store.write_page(pid, 0, &[2, 2, 2, 2]);
        assert_eq!(store.read_page(pid, 0), vec![2, 2, 2, 2]);
    }

    #[test]
    fn open_existing_rebuilds_index_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        {
            let mut store = BackingStore::new(&path, 4).unwrap();
            store.write_page(ProcessId::new(5), 1, &[9, 9, 9, 9]);
        }
        let reopened = BackingStore::open_existing(&path, 4).unwrap();
        assert_eq!(reopened.read_page(ProcessId::new(5), 1), vec![9, 9, 9, 9]);
    }

    #[test]
    fn purge_removes_a_process_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.txt");
        let mut store = BackingStore::new(&path, 4).unwrap();
        let pid = ProcessId::new(1);
        store.write_page(pid, 0, &[1, 2, 3, 4]);
        store.purge(pid);
        assert_eq!(store.read_page(pid, 0), vec![0, 0, 0, 0]);
    }
}
