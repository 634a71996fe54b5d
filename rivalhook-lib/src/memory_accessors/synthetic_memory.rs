use std::{
    ops::Range,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Result};

use super::MemoryAccessor;

const ALLOCATION_ALIGN: usize = 16;

struct Inner {
    base: usize,
    bytes: Vec<u8>,
    executable: Vec<Range<usize>>,
    locked: Vec<Range<usize>>,
    code_writes: usize,
}

impl Inner {
    fn range(&self, addr: usize, len: usize) -> Result<Range<usize>> {
        let end = self.base + self.bytes.len();
        if addr < self.base || addr.checked_add(len).map_or(true, |last| last > end) {
            bail!(
                "{:#x}..+{} is outside synthetic memory {:#x}..{:#x}",
                addr,
                len,
                self.base,
                end
            );
        }
        Ok(addr - self.base..addr - self.base + len)
    }

    fn covered_by(ranges: &[Range<usize>], addr: usize, len: usize) -> bool {
        ranges
            .iter()
            .any(|r| r.start <= addr && addr + len <= r.end)
    }

    fn overlaps(ranges: &[Range<usize>], addr: usize, len: usize) -> bool {
        ranges
            .iter()
            .any(|r| r.start < addr + len && addr < r.end)
    }
}

/// A flat buffer posing as a process address space.
///
/// Everything is plain data until marked executable. Executable ranges can be
/// locked to make code writes fail the way an anti-tamper page would.
pub struct SyntheticMemory {
    inner: Mutex<Inner>,
}

impl SyntheticMemory {
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                base,
                bytes: vec![0; len],
                executable: Vec::new(),
                locked: Vec::new(),
                code_writes: 0,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_executable(&self, addr: usize, len: usize) {
        self.inner().executable.push(addr..addr + len);
    }

    pub fn lock_code(&self, addr: usize, len: usize) {
        self.inner().locked.push(addr..addr + len);
    }

    /// Number of successful [`MemoryAccessor::write_code`] calls.
    pub fn code_writes(&self) -> usize {
        self.inner().code_writes
    }

    pub fn bytes(&self, addr: usize, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0; len];
        self.read(addr, &mut buffer)?;
        Ok(buffer)
    }
}

impl MemoryAccessor for SyntheticMemory {
    fn read(&self, addr: usize, buffer: &mut [u8]) -> Result<()> {
        let inner = self.inner();
        let range = inner.range(addr, buffer.len())?;
        buffer.copy_from_slice(&inner.bytes[range]);
        Ok(())
    }

    fn write(&self, addr: usize, buffer: &[u8]) -> Result<()> {
        let mut inner = self.inner();
        let range = inner.range(addr, buffer.len())?;
        inner.bytes[range].copy_from_slice(buffer);
        Ok(())
    }

    fn is_executable(&self, addr: usize, size: usize) -> Result<bool> {
        let inner = self.inner();
        inner.range(addr, size)?;
        Ok(Inner::covered_by(&inner.executable, addr, size))
    }

    unsafe fn write_code(&self, addr: usize, code: &[u8]) -> Result<()> {
        let mut inner = self.inner();
        let range = inner.range(addr, code.len())?;
        if !Inner::covered_by(&inner.executable, addr, code.len()) {
            bail!("{:#x} is not code", addr);
        }
        if Inner::overlaps(&inner.locked, addr, code.len()) {
            bail!("changing protection of {:#x} was denied", addr);
        }
        inner.bytes[range].copy_from_slice(code);
        inner.code_writes += 1;
        Ok(())
    }

    fn alloc_executable(&self, code: &[u8]) -> Result<usize> {
        let mut inner = self.inner();
        let addr = inner.base + inner.bytes.len();
        let len = code.len().next_multiple_of(ALLOCATION_ALIGN).max(ALLOCATION_ALIGN);
        let new_len = inner.bytes.len() + len;
        inner.bytes.extend_from_slice(code);
        inner.bytes.resize(new_len, 0xcc); // int3
        inner.executable.push(addr..addr + len);
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes_inside_bounds() {
        let memory = SyntheticMemory::new(0x1000, 0x100);
        memory.write(0x1010, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.bytes(0x100f, 6).unwrap(), vec![0, 1, 2, 3, 4, 0]);
    }

    #[test]
    fn rejects_out_of_bounds_access() {
        let memory = SyntheticMemory::new(0x1000, 0x100);
        assert!(memory.read(0xfff, &mut [0; 1]).is_err());
        assert!(memory.write(0x10fe, &[0; 4]).is_err());
        assert!(memory.read(usize::MAX, &mut [0; 4]).is_err());
    }

    #[test]
    fn code_writes_need_executable_unlocked_memory() {
        let memory = SyntheticMemory::new(0x1000, 0x100);
        assert!(unsafe { memory.write_code(0x1000, &[0x90]) }.is_err());

        memory.mark_executable(0x1000, 0x40);
        assert!(memory.is_executable(0x1000, 0x40).unwrap());
        assert!(!memory.is_executable(0x1000, 0x41).unwrap());
        unsafe { memory.write_code(0x1000, &[0x90]) }.unwrap();

        memory.lock_code(0x1020, 0x10);
        assert!(unsafe { memory.write_code(0x101e, &[0x90; 4]) }.is_err());
        assert_eq!(memory.code_writes(), 1);
    }

    #[test]
    fn allocations_are_executable_and_disjoint() {
        let memory = SyntheticMemory::new(0x1000, 0x100);
        let first = memory.alloc_executable(&[0xc3]).unwrap();
        let second = memory.alloc_executable(&[0x90; 20]).unwrap();
        assert_eq!(first, 0x1100);
        assert_eq!(second, 0x1110);
        assert!(memory.is_executable(second, 20).unwrap());
        assert_eq!(memory.bytes(first, 2).unwrap(), vec![0xc3, 0xcc]);
    }
}
