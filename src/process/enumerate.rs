//! Process enumeration.
//!
//! Lists candidate processes for scanning, with enough metadata to
//! report detections by name. Backed by `/proc` on Linux and the
//! Toolhelp snapshot API on Windows.

use crate::core::error::Result;
use std::path::PathBuf;

/// A running process eligible for scanning.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Process name
    pub name: String,
    /// Full path to the executable, when resolvable
    pub path: Option<PathBuf>,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Process enumerator for listing running processes.
pub struct ProcessEnumerator {
    /// Include processes without executable path
    include_pathless: bool,
}

impl Default for ProcessEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnumerator {
    pub fn new() -> Self {
        Self {
            include_pathless: true,
        }
    }

    /// Configure whether to include processes without executable path.
    pub fn with_pathless_processes(mut self, include: bool) -> Self {
        self.include_pathless = include;
        self
    }

    /// Enumerate all running processes.
    pub fn enumerate(&self) -> Result<Vec<ProcessInfo>> {
        #[cfg(target_os = "windows")]
        {
            self.enumerate_windows()
        }

        #[cfg(target_os = "linux")]
        {
            self.enumerate_linux()
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            Ok(Vec::new())
        }
    }

    /// Look up a specific process by PID.
    pub fn get_process(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        #[cfg(target_os = "windows")]
        {
            self.get_process_windows(pid)
        }

        #[cfg(target_os = "linux")]
        {
            Ok(self.read_proc_info(pid))
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = pid;
            Ok(None)
        }
    }

    #[cfg(target_os = "windows")]
    fn enumerate_windows(&self) -> Result<Vec<ProcessInfo>> {
        use std::ffi::OsString;
        use std::mem;
        use std::os::windows::ffi::OsStringExt;
        use windows::core::PWSTR;
        use windows::Win32::Foundation::{CloseHandle, MAX_PATH};
        use windows::Win32::System::Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
            TH32CS_SNAPPROCESS,
        };
        use windows::Win32::System::Threading::{
            OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
            PROCESS_QUERY_LIMITED_INFORMATION,
        };

        let mut processes = Vec::new();

        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(|e| {
                crate::core::error::Error::ProcessEnumeration(format!(
                    "failed to create snapshot: {}",
                    e
                ))
            })?;

            let mut entry: PROCESSENTRY32W = mem::zeroed();
            entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let pid = entry.th32ProcessID;

                    let name_len = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    let name = OsString::from_wide(&entry.szExeFile[..name_len])
                        .to_string_lossy()
                        .to_string();

                    let mut info = ProcessInfo::new(pid, &name);

                    if let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid)
                    {
                        let mut buffer = [0u16; MAX_PATH as usize];
                        let mut size = buffer.len() as u32;

                        if QueryFullProcessImageNameW(
                            handle,
                            PROCESS_NAME_WIN32,
                            PWSTR::from_raw(buffer.as_mut_ptr()),
                            &mut size,
                        )
                        .is_ok()
                        {
                            let path = OsString::from_wide(&buffer[..size as usize])
                                .to_string_lossy()
                                .to_string();
                            info.path = Some(PathBuf::from(path));
                        }

                        let _ = CloseHandle(handle);
                    }

                    if self.include_pathless || info.path.is_some() {
                        processes.push(info);
                    }

                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
        }

        Ok(processes)
    }

    #[cfg(target_os = "windows")]
    fn get_process_windows(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        Ok(self
            .enumerate_windows()?
            .into_iter()
            .find(|p| p.pid == pid))
    }

    #[cfg(target_os = "linux")]
    fn enumerate_linux(&self) -> Result<Vec<ProcessInfo>> {
        use std::fs;

        let mut processes = Vec::new();

        if let Ok(entries) = fs::read_dir("/proc") {
            for entry in entries.filter_map(|e| e.ok()) {
                let file_name = entry.file_name();
                let name_str = file_name.to_string_lossy();

                // Only numeric directories are PIDs
                if let Ok(pid) = name_str.parse::<u32>() {
                    if let Some(info) = self.read_proc_info(pid) {
                        if !self.include_pathless && info.path.is_none() {
                            continue;
                        }
                        processes.push(info);
                    }
                }
            }
        }

        Ok(processes)
    }

    #[cfg(target_os = "linux")]
    fn read_proc_info(&self, pid: u32) -> Option<ProcessInfo> {
        use std::fs;

        let proc_dir = format!("/proc/{}", pid);

        let name = fs::read_to_string(format!("{}/comm", proc_dir))
            .ok()
            .map(|s| s.trim().to_string())?;

        let mut info = ProcessInfo::new(pid, name);

        if let Ok(exe_path) = fs::read_link(format!("{}/exe", proc_dir)) {
            info.path = Some(exe_path);
        }

        Some(info)
    }
}
