use std::{
    ffi::c_void,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use rivalhook_lib::{
    memory_accessors::{module_base_addr, HookedProcess},
    tick_bridge::unhook,
    HookBinding, HostChannel, PreparedHook, Settings, SystemClock, TickBridge,
};
use tracing::{error, info};

/// The host's per-frame simulation step.
type TickFn = extern "system" fn(this: *mut c_void, delta_time: f32);

struct Runtime {
    original: TickFn,
    bridge: Mutex<TickBridge<HookedProcess, SystemClock>>,
    binding: Mutex<Option<HookBinding<HookedProcess>>>,
}

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

extern "system" fn on_tick(this: *mut c_void, delta_time: f32) {
    let Some(runtime) = RUNTIME.get() else {
        return;
    };
    // a nested or concurrent tick goes straight to the original
    if let Ok(mut bridge) = runtime.bridge.try_lock() {
        bridge.on_tick();
    }
    (runtime.original)(this, delta_time)
}

pub fn activate(settings_path: &Path) -> Result<()> {
    let settings = Settings::load_or_default(settings_path)?;
    let module_base = match &settings.module {
        Some(name) => module_base_addr(name)?,
        None => 0,
    };
    let table = settings.address_table(module_base);
    info!(
        "tick at {:#x}, input at {:#x}, lanes in {:?}",
        table.tick.target,
        table.input_action,
        settings.channel.lane_dir()
    );

    let memory = Arc::new(HookedProcess::new());
    let prepared = PreparedHook::new(memory.clone(), table.tick)?;
    let channel = HostChannel::attach(&settings.channel)?;
    let bridge = TickBridge::new(
        memory,
        &table,
        channel,
        SystemClock::new(),
        settings.channel.action_wait(),
        settings.diagnostics.stats_interval,
    );
    RUNTIME
        .set(Runtime {
            original: unsafe { prepared.original_fn() },
            bridge: Mutex::new(bridge),
            binding: Mutex::new(None),
        })
        .map_err(|_| anyhow!("tick hook is already set up"))?;
    let runtime = RUNTIME
        .get()
        .ok_or_else(|| anyhow!("tick hook runtime is missing"))?;

    let binding = prepared.activate(on_tick as usize)?;
    *runtime
        .binding
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(binding);
    Ok(())
}

pub fn deactivate() {
    let Some(runtime) = RUNTIME.get() else {
        return;
    };
    let binding = runtime
        .binding
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Err(err) = unhook(binding, &runtime.bridge) {
        error!("failed to restore the tick function: {}", err);
    }
}
