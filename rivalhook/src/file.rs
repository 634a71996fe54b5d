use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use windows::{
    core::PCWSTR,
    Win32::Foundation::{HMODULE, MAX_PATH},
    Win32::System::LibraryLoader::GetModuleFileNameW,
};

pub fn to_dll_path(module: HMODULE) -> Result<PathBuf> {
    let mut buf = [0u16; MAX_PATH as usize];
    if unsafe { GetModuleFileNameW(module, &mut buf) } == 0 {
        bail!("GetModuleFileNameW failed");
    }
    let dll_path = unsafe { PCWSTR::from_raw(buf.as_ptr()).to_string() }?;
    Ok(PathBuf::from(dll_path))
}

fn dll_stem(dll_path: &Path) -> String {
    dll_path
        .file_stem()
        .map_or_else(|| "rivalhook".into(), |stem| stem.to_string_lossy())
        .into_owned()
}

pub fn dll_dir(dll_path: &Path) -> &Path {
    dll_path.parent().unwrap_or(Path::new("."))
}

pub fn log_file_name(dll_path: &Path) -> String {
    format!("{}.log", dll_stem(dll_path))
}

pub fn settings_path(dll_path: &Path) -> PathBuf {
    dll_dir(dll_path).join(format!("{}.toml", dll_stem(dll_path)))
}
