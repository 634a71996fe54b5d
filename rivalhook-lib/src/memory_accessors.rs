#[cfg(target_os = "windows")]
mod hooked_process;
mod synthetic_memory;

use anyhow::Result;

#[cfg(target_os = "windows")]
pub use hooked_process::{module_base_addr, HookedProcess};
pub use synthetic_memory::SyntheticMemory;

/// Read/write capability over the address space the host lives in.
///
/// Addresses are absolute. The in-process implementation performs no bounds
/// checks, so a wrong address is undefined behavior there.
pub trait MemoryAccessor {
    fn read(&self, addr: usize, buffer: &mut [u8]) -> Result<()>;
    fn write(&self, addr: usize, buffer: &[u8]) -> Result<()>;

    /// Whether `size` bytes from `addr` are committed executable memory.
    fn is_executable(&self, addr: usize, size: usize) -> Result<bool>;

    /// Overwrites machine code, lifting page protection for the duration.
    ///
    /// # Safety
    /// Other threads may be executing the bytes being replaced.
    unsafe fn write_code(&self, addr: usize, code: &[u8]) -> Result<()>;

    /// Copies `code` into freshly allocated executable memory and returns its
    /// address. The allocation lives until the process exits.
    fn alloc_executable(&self, code: &[u8]) -> Result<usize>;
}
