#![cfg(windows)]

mod file;
mod tick_hook;
mod tracing_helper;

use std::ffi::c_void;

use tracing::error;
use windows::Win32::{
    Foundation::{BOOL, HINSTANCE, HMODULE, TRUE},
    System::{
        Console::AllocConsole,
        SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH},
    },
};

fn on_process_attach(inst_dll: HINSTANCE) {
    if cfg!(debug_assertions) {
        let _ = unsafe { AllocConsole() };
        std::env::set_var("RUST_BACKTRACE", "1");
    }
    let Ok(dll_path) = file::to_dll_path(HMODULE(inst_dll.0)) else {
        return;
    };
    if tracing_helper::init_tracing(
        file::dll_dir(&dll_path),
        &file::log_file_name(&dll_path),
        cfg!(debug_assertions),
    )
    .is_err()
    {
        return;
    }

    if let Err(err) = tick_hook::activate(&file::settings_path(&dll_path)) {
        error!("rivalhook is disabled: {:#}", err);
    }
}

#[no_mangle]
pub extern "system" fn DllMain(inst_dll: HINSTANCE, reason: u32, reserved: *mut c_void) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => on_process_attach(inst_dll),
        // on process exit the code pages go away with everything else
        DLL_PROCESS_DETACH if reserved.is_null() => tick_hook::deactivate(),
        _ => {}
    }
    TRUE
}
