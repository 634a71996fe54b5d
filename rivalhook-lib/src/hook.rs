use std::{
    mem::{size_of, transmute_copy},
    sync::Arc,
};

use derive_new::new;
use getset::CopyGetters;
use thiserror::Error;
use tracing::{error, info};

use crate::memory_accessors::MemoryAccessor;

const NOP: u8 = 0x90;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("target {0:#x} is not executable")]
    NotExecutable(usize),
    #[error("target {0:#x} is already hooked")]
    AlreadyHooked(usize),
    #[error("a {len}-byte prologue cannot hold a {required}-byte jump")]
    PrologueTooShort { len: usize, required: usize },
    #[error(transparent)]
    Memory(#[from] anyhow::Error),
}

/// Absolute jump sequences, independent of where they are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpStub {
    /// `jmp qword ptr [rip+0]` followed by the destination.
    Indirect64,
    /// `push imm32; ret`
    PushRet32,
}

impl JumpStub {
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Indirect64
        } else {
            Self::PushRet32
        }
    }

    pub const fn len(self) -> usize {
        match self {
            Self::Indirect64 => 14,
            Self::PushRet32 => 6,
        }
    }

    pub fn assemble(self, destination: usize) -> Vec<u8> {
        let mut code = Vec::with_capacity(self.len());
        match self {
            Self::Indirect64 => {
                code.extend_from_slice(&[0xff, 0x25, 0x00, 0x00, 0x00, 0x00]);
                code.extend_from_slice(&(destination as u64).to_le_bytes());
            }
            Self::PushRet32 => {
                code.push(0x68);
                code.extend_from_slice(&(destination as u32).to_le_bytes());
                code.push(0xc3);
            }
        }
        code
    }
}

/// Whether `prologue` already starts with a jump planted by some hook.
///
/// Targets must be real function bodies. An incremental-link thunk also
/// starts with `E9` and is reported as hooked.
fn looks_hooked(prologue: &[u8]) -> bool {
    matches!(
        prologue,
        [0xe9, ..] | [0xff, 0x25, ..] | [0x68, _, _, _, _, 0xc3, ..]
    )
}

/// The function to intercept.
///
/// The first `prologue_len` bytes of the target must be whole instructions
/// that still work when moved elsewhere; they are relocated into the
/// trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct HookSite {
    pub target: usize,
    pub prologue_len: usize,
}

/// A trampoline has been built but the target is still untouched.
pub struct PreparedHook<M: MemoryAccessor> {
    memory: Arc<M>,
    site: HookSite,
    stub: JumpStub,
    original_bytes: Vec<u8>,
    trampoline: usize,
}

impl<M: MemoryAccessor> PreparedHook<M> {
    pub fn new(memory: Arc<M>, site: HookSite) -> Result<Self, HookError> {
        Self::with_stub(memory, site, JumpStub::native())
    }

    pub fn with_stub(memory: Arc<M>, site: HookSite, stub: JumpStub) -> Result<Self, HookError> {
        if site.prologue_len < stub.len() {
            return Err(HookError::PrologueTooShort {
                len: site.prologue_len,
                required: stub.len(),
            });
        }
        if !memory.is_executable(site.target, site.prologue_len)? {
            return Err(HookError::NotExecutable(site.target));
        }
        let mut original_bytes = vec![0; site.prologue_len];
        memory.read(site.target, &mut original_bytes)?;
        if looks_hooked(&original_bytes) {
            return Err(HookError::AlreadyHooked(site.target));
        }

        let mut trampoline_code = original_bytes.clone();
        trampoline_code.extend(stub.assemble(site.target + site.prologue_len));
        let trampoline = memory.alloc_executable(&trampoline_code)?;

        Ok(Self {
            memory,
            site,
            stub,
            original_bytes,
            trampoline,
        })
    }

    /// Address that runs the original function when called.
    pub fn original(&self) -> usize {
        self.trampoline
    }

    /// # Safety
    /// `F` must be a function pointer type with the target's exact signature
    /// and calling convention.
    pub unsafe fn original_fn<F: Copy>(&self) -> F {
        assert_eq!(size_of::<F>(), size_of::<usize>());
        transmute_copy(&self.trampoline)
    }

    /// Redirects the target to `handler`.
    pub fn activate(self, handler: usize) -> Result<HookBinding<M>, HookError> {
        let mut current = vec![0; self.site.prologue_len];
        self.memory.read(self.site.target, &mut current)?;
        if current != self.original_bytes {
            return Err(HookError::AlreadyHooked(self.site.target));
        }

        let mut patch = self.stub.assemble(handler);
        patch.resize(self.site.prologue_len, NOP);
        unsafe { self.memory.write_code(self.site.target, &patch) }?;
        info!(
            "hooked {:#x} -> {:#x} (original via {:#x})",
            self.site.target, handler, self.trampoline
        );

        Ok(HookBinding {
            memory: self.memory,
            site: self.site,
            original: self.trampoline,
            original_bytes: self.original_bytes,
            active: true,
        })
    }
}

/// An installed redirection of one target to one handler.
///
/// Dropping an active binding restores the target.
#[derive(CopyGetters)]
pub struct HookBinding<M: MemoryAccessor> {
    memory: Arc<M>,
    site: HookSite,
    /// Trampoline address; calling it runs the original function.
    #[getset(get_copy = "pub")]
    original: usize,
    original_bytes: Vec<u8>,
    active: bool,
}

impl<M: MemoryAccessor> HookBinding<M> {
    pub fn activate(memory: Arc<M>, site: HookSite, handler: usize) -> Result<Self, HookError> {
        PreparedHook::new(memory, site)?.activate(handler)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Puts the original prologue back. Does nothing when already inactive.
    pub fn deactivate(&mut self) -> Result<(), HookError> {
        if !self.active {
            return Ok(());
        }
        unsafe { self.memory.write_code(self.site.target, &self.original_bytes) }?;
        self.active = false;
        info!("unhooked {:#x}", self.site.target);
        Ok(())
    }
}

impl<M: MemoryAccessor> Drop for HookBinding<M> {
    fn drop(&mut self) {
        if let Err(err) = self.deactivate() {
            error!("failed to unhook {:#x}: {}", self.site.target, err);
        }
    }
}
