//! Contiguous first-fit memory manager.
//!
//! The address space `[0, total)` is covered by an ordered list of blocks
//! with no gaps. Allocation scans for the lowest-address free block large
//! enough for the request and splits it exactly; freeing coalesces with
//! both neighbours so free space never stays fragmented across adjacent
//! blocks. A single mutex guards the map; every operation is a short
//! critical section and nothing blocks while holding it.
//!
//! The dispatcher uses [`allocate`](MemoryManager::allocate) /
//! [`is_allocated`](MemoryManager::is_allocated) as its admission check: a
//! process with no memory does not reach a CPU.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;

use crate::evaluator::TIMESTAMP_FORMAT;

/// One contiguous span of the managed address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub start: u32,
    pub size: u32,
    /// Owning pid, or `None` for a free block.
    pub owner: Option<u32>,
}

/// First-fit allocator over a fixed contiguous range.
#[derive(Debug)]
pub struct MemoryManager {
    total: u32,
    map: Mutex<Vec<MemoryBlock>>,
}

impl MemoryManager {
    /// Create a manager over `total` bytes, initially one free block.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            map: Mutex::new(vec![MemoryBlock {
                start: 0,
                size: total,
                owner: None,
            }]),
        }
    }

    /// Total managed bytes.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Reserve `size` bytes for `pid` at the lowest possible address.
    ///
    /// Returns `false` when no single free block can hold the request;
    /// external fragmentation counts as failure even if the free total
    /// would suffice.
    pub fn allocate(&self, pid: u32, size: u32) -> bool {
        let mut map = self.map.lock().unwrap();
        for i in 0..map.len() {
            let block = map[i];
            if block.owner.is_some() || block.size < size {
                continue;
            }
            map[i].owner = Some(pid);
            if block.size > size {
                map[i].size = size;
                map.insert(
                    i + 1,
                    MemoryBlock {
                        start: block.start + size,
                        size: block.size - size,
                        owner: None,
                    },
                );
            }
            return true;
        }
        false
    }

    /// Release `pid`'s block, if any, and coalesce with free neighbours.
    pub fn free(&self, pid: u32) {
        let mut map = self.map.lock().unwrap();
        let Some(i) = map.iter().position(|b| b.owner == Some(pid)) else {
            return;
        };
        map[i].owner = None;

        // Merge the right neighbour first so the left merge sees the
        // combined size.
        if i + 1 < map.len() && map[i + 1].owner.is_none() {
            map[i].size += map[i + 1].size;
            map.remove(i + 1);
        }
        if i > 0 && map[i - 1].owner.is_none() {
            map[i - 1].size += map[i].size;
            map.remove(i);
        }
    }

    /// Whether `pid` currently holds a block.
    pub fn is_allocated(&self, pid: u32) -> bool {
        self.map
            .lock()
            .unwrap()
            .iter()
            .any(|b| b.owner == Some(pid))
    }

    /// Snapshot of the block map, lowest address first.
    pub fn blocks(&self) -> Vec<MemoryBlock> {
        self.map.lock().unwrap().clone()
    }

    /// Free bytes outside any allocation.
    pub fn external_fragmentation(&self) -> u32 {
        self.map
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.owner.is_none())
            .map(|b| b.size)
            .sum()
    }

    /// Write the memory report: timestamp, occupancy, fragmentation, and
    /// the block layout from address 0 upward.
    pub fn snapshot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let map = self.map.lock().unwrap();

        let in_memory = map.iter().filter(|b| b.owner.is_some()).count();
        let frag_bytes: u32 = map
            .iter()
            .filter(|b| b.owner.is_none())
            .map(|b| b.size)
            .sum();

        writeln!(out, "Timestamp: {}", Local::now().format(TIMESTAMP_FORMAT))?;
        writeln!(out, "Number of processes in memory: {}", in_memory)?;
        writeln!(
            out,
            "Total external fragmentation: {:.2} KB",
            f64::from(frag_bytes) / 1024.0
        )?;
        writeln!(out)?;

        writeln!(out, "[ 0x{:04x} ] ---", 0)?;
        for block in map.iter() {
            match block.owner {
                Some(pid) => writeln!(out, "|  P{:02}  |", pid)?,
                None => writeln!(out, "| FREE |")?,
            }
            writeln!(out, "[ 0x{:04x} ] ---", block.start + block.size)?;
        }
        Ok(())
    }

    /// Convenience wrapper writing [`snapshot`](MemoryManager::snapshot)
    /// to a file.
    pub fn write_snapshot(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        self.snapshot(&mut file)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
