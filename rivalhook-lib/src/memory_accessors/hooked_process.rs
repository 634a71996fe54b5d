use std::{
    ffi::c_void,
    mem::{size_of, MaybeUninit},
};

use anyhow::{bail, Result};
use windows::{
    core::HSTRING,
    Win32::System::{
        Diagnostics::Debug::FlushInstructionCache,
        LibraryLoader::GetModuleHandleW,
        Memory::{
            VirtualAlloc, VirtualProtect, VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
            MEM_RESERVE, PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
            PAGE_EXECUTE_WRITECOPY, PAGE_PROTECTION_FLAGS,
        },
        ProcessStatus::{GetModuleInformation, MODULEINFO},
        Threading::GetCurrentProcess,
    },
};

use super::MemoryAccessor;

pub fn module_base_addr(module_name: &str) -> Result<usize> {
    let module = unsafe { GetModuleHandleW(&HSTRING::from(module_name)) }?;
    let mut module_info: MODULEINFO = Default::default();
    unsafe {
        GetModuleInformation(
            GetCurrentProcess(),
            module,
            &mut module_info,
            size_of::<MODULEINFO>() as u32,
        )
    }?;
    Ok(module_info.lpBaseOfDll as usize)
}

fn flush_instruction_cache(addr: usize, size: usize) -> Result<()> {
    unsafe { FlushInstructionCache(GetCurrentProcess(), Some(addr as *const c_void), size) }?;
    Ok(())
}

/// The address space of the process this DLL is loaded into.
#[derive(Default)]
pub struct HookedProcess;

impl HookedProcess {
    pub fn new() -> Self {
        Self
    }

    fn virtual_protect(
        &self,
        addr: usize,
        size: usize,
        protect: PAGE_PROTECTION_FLAGS,
    ) -> Result<PAGE_PROTECTION_FLAGS> {
        let mut old: PAGE_PROTECTION_FLAGS = Default::default();
        unsafe { VirtualProtect(addr as *const c_void, size, protect, &mut old) }?;
        Ok(old)
    }
}

impl MemoryAccessor for HookedProcess {
    fn read(&self, addr: usize, buffer: &mut [u8]) -> Result<()> {
        unsafe { (addr as *const u8).copy_to_nonoverlapping(buffer.as_mut_ptr(), buffer.len()) };
        Ok(())
    }

    fn write(&self, addr: usize, buffer: &[u8]) -> Result<()> {
        unsafe { (addr as *mut u8).copy_from_nonoverlapping(buffer.as_ptr(), buffer.len()) };
        Ok(())
    }

    fn is_executable(&self, addr: usize, size: usize) -> Result<bool> {
        let mut info = MaybeUninit::<MEMORY_BASIC_INFORMATION>::zeroed();
        let written = unsafe {
            VirtualQuery(
                Some(addr as *const c_void),
                info.as_mut_ptr(),
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            bail!("VirtualQuery failed for {:#x}", addr);
        }
        let info = unsafe { info.assume_init() };
        let executable =
            PAGE_EXECUTE | PAGE_EXECUTE_READ | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY;
        let region_end = info.BaseAddress as usize + info.RegionSize;
        Ok(info.State == MEM_COMMIT
            && (info.Protect & executable).0 != 0
            && addr + size <= region_end)
    }

    unsafe fn write_code(&self, addr: usize, code: &[u8]) -> Result<()> {
        let old = self.virtual_protect(addr, code.len(), PAGE_EXECUTE_READWRITE)?;
        self.write(addr, code)?;
        self.virtual_protect(addr, code.len(), old)?;
        flush_instruction_cache(addr, code.len())
    }

    fn alloc_executable(&self, code: &[u8]) -> Result<usize> {
        let ptr = unsafe {
            VirtualAlloc(
                None,
                code.len(),
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if ptr.is_null() {
            bail!("VirtualAlloc failed for {} bytes", code.len());
        }
        let addr = ptr as usize;
        self.write(addr, code)?;
        flush_instruction_cache(addr, code.len())?;
        Ok(addr)
    }
}
