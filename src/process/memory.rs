//! Process memory region enumeration and reading.
//!
//! Backed by `/proc/[pid]/maps` and `/proc/[pid]/mem` on Linux and by
//! `VirtualQueryEx`/`ReadProcessMemory` on Windows. Other platforms
//! enumerate nothing.

use crate::core::error::{Error, Result};

/// Memory protection flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionFlags {
    /// Memory is readable
    pub read: bool,
    /// Memory is writable
    pub write: bool,
    /// Memory is executable
    pub execute: bool,
    /// Memory is guarded
    pub guard: bool,
}

impl ProtectionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// A region is worth scanning only if it can be read without
    /// tripping a guard page.
    pub fn is_scannable(&self) -> bool {
        self.read && !self.guard
    }
}

impl std::fmt::Display for ProtectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut flags = String::new();
        flags.push(if self.read { 'R' } else { '-' });
        flags.push(if self.write { 'W' } else { '-' });
        flags.push(if self.execute { 'X' } else { '-' });
        if self.guard {
            flags.push('G');
        }
        write!(f, "{}", flags)
    }
}

/// A half-open address range `[base, end)` within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Base address of the region
    pub base: u64,
    /// End address (exclusive)
    pub end: u64,
}

impl MemoryRegion {
    pub fn new(base: u64, end: u64) -> Self {
        Self { base, end }
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.base)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.base
    }

    /// Whether `address` falls inside this region.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end
    }
}

/// A region together with its protection and backing file, as reported
/// by the platform.
#[derive(Debug, Clone)]
pub struct MappedRegion {
    pub region: MemoryRegion,
    pub protection: ProtectionFlags,
    /// Associated module/file path
    pub mapped_file: Option<String>,
}

/// Finds the region containing `address`, if any.
pub fn find_region(regions: &[MemoryRegion], address: u64) -> Option<MemoryRegion> {
    regions.iter().copied().find(|r| r.contains(address))
}

/// Looks up the end address of the region starting at `base`.
pub fn region_end(regions: &[MemoryRegion], base: u64) -> Option<u64> {
    regions.iter().find(|r| r.base == base).map(|r| r.end)
}

/// Reads memory regions and contents from live processes.
#[derive(Debug, Default)]
pub struct MemoryReader;

impl MemoryReader {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate the committed memory regions of a process.
    pub fn regions(&self, pid: u32) -> Result<Vec<MappedRegion>> {
        #[cfg(target_os = "windows")]
        {
            self.regions_windows(pid)
        }

        #[cfg(target_os = "linux")]
        {
            self.regions_linux(pid)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = pid;
            Ok(Vec::new())
        }
    }

    /// Read `length` bytes at `address` from the process.
    ///
    /// A short or failed read is a [`Error::ReadFault`]; callers treat
    /// it as recoverable and move on to the next region.
    pub fn read(&self, pid: u32, address: u64, length: usize) -> Result<Vec<u8>> {
        #[cfg(target_os = "windows")]
        {
            self.read_windows(pid, address, length)
        }

        #[cfg(target_os = "linux")]
        {
            self.read_linux(pid, address, length)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = (pid, address);
            Err(Error::read_fault(0, 0, length as u64))
        }
    }

    #[cfg(target_os = "windows")]
    fn regions_windows(&self, pid: u32) -> Result<Vec<MappedRegion>> {
        use std::mem;
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Memory::{
            VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
        };
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
        };

        let mut regions = Vec::new();

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid)
                .map_err(|e| Error::RegionEnumeration {
                    pid,
                    reason: format!("failed to open process: {}", e),
                })?;

            let mut address: usize = 0;
            let mut mbi: MEMORY_BASIC_INFORMATION = mem::zeroed();

            loop {
                let result = VirtualQueryEx(
                    handle,
                    Some(address as *const std::ffi::c_void),
                    &mut mbi,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                );

                if result == 0 {
                    break;
                }

                // Only include committed memory
                if mbi.State == MEM_COMMIT {
                    let base = mbi.BaseAddress as u64;
                    regions.push(MappedRegion {
                        region: MemoryRegion::new(base, base + mbi.RegionSize as u64),
                        protection: parse_windows_protection(mbi.Protect.0),
                        mapped_file: None,
                    });
                }

                address = mbi.BaseAddress as usize + mbi.RegionSize;
                if address == 0 {
                    break;
                }
            }

            let _ = CloseHandle(handle);
        }

        Ok(regions)
    }

    #[cfg(target_os = "linux")]
    fn regions_linux(&self, pid: u32) -> Result<Vec<MappedRegion>> {
        use std::fs;

        let maps_path = format!("/proc/{}/maps", pid);
        let maps_content = fs::read_to_string(&maps_path).map_err(|e| Error::RegionEnumeration {
            pid,
            reason: format!("failed to read {}: {}", maps_path, e),
        })?;

        Ok(maps_content
            .lines()
            .filter_map(parse_linux_maps_line)
            .collect())
    }

    #[cfg(target_os = "windows")]
    fn read_windows(&self, pid: u32, address: u64, length: usize) -> Result<Vec<u8>> {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
        use windows::Win32::System::Threading::{OpenProcess, PROCESS_VM_READ};

        let mut buffer = vec![0u8; length];

        unsafe {
            let handle = OpenProcess(PROCESS_VM_READ, false, pid)
                .map_err(|_| Error::read_fault(pid, address, length as u64))?;

            let mut bytes_read = 0usize;
            let result = ReadProcessMemory(
                handle,
                address as *const std::ffi::c_void,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                length,
                Some(&mut bytes_read),
            );

            let _ = CloseHandle(handle);

            if result.is_err() || bytes_read == 0 {
                return Err(Error::read_fault(pid, address, length as u64));
            }

            buffer.truncate(bytes_read);
        }

        Ok(buffer)
    }

    #[cfg(target_os = "linux")]
    fn read_linux(&self, pid: u32, address: u64, length: usize) -> Result<Vec<u8>> {
        use std::fs::File;
        use std::io::{Read, Seek, SeekFrom};

        let mem_path = format!("/proc/{}/mem", pid);
        let mut file =
            File::open(&mem_path).map_err(|_| Error::read_fault(pid, address, length as u64))?;

        file.seek(SeekFrom::Start(address))
            .map_err(|_| Error::read_fault(pid, address, length as u64))?;

        let mut buffer = vec![0u8; length];
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|_| Error::read_fault(pid, address, length as u64))?;
        if bytes_read == 0 {
            return Err(Error::read_fault(pid, address, length as u64));
        }
        buffer.truncate(bytes_read);

        Ok(buffer)
    }
}

#[cfg(target_os = "windows")]
fn parse_windows_protection(protect: u32) -> ProtectionFlags {
    use windows::Win32::System::Memory::{
        PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
        PAGE_GUARD, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
    };

    let mut flags = ProtectionFlags::new();
    let base_protect = protect & 0xFF;

    if base_protect == PAGE_READONLY.0 {
        flags.read = true;
    } else if base_protect == PAGE_READWRITE.0 || base_protect == PAGE_WRITECOPY.0 {
        flags.read = true;
        flags.write = true;
    } else if base_protect == PAGE_EXECUTE.0 {
        flags.execute = true;
    } else if base_protect == PAGE_EXECUTE_READ.0 {
        flags.read = true;
        flags.execute = true;
    } else if base_protect == PAGE_EXECUTE_READWRITE.0
        || base_protect == PAGE_EXECUTE_WRITECOPY.0
    {
        flags.read = true;
        flags.write = true;
        flags.execute = true;
    }

    if protect & PAGE_GUARD.0 != 0 {
        flags.guard = true;
    }

    flags
}

/// Parse a line from /proc/[pid]/maps.
#[cfg(target_os = "linux")]
fn parse_linux_maps_line(line: &str) -> Option<MappedRegion> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    let addr_parts: Vec<&str> = parts[0].split('-').collect();
    if addr_parts.len() != 2 {
        return None;
    }

    let start = u64::from_str_radix(addr_parts[0], 16).ok()?;
    let end = u64::from_str_radix(addr_parts[1], 16).ok()?;

    let perms = parts.get(1).unwrap_or(&"----");
    let protection = ProtectionFlags {
        read: perms.contains('r'),
        write: perms.contains('w'),
        execute: perms.contains('x'),
        guard: false,
    };

    let mapped_file = parts
        .get(5)
        .map(|_| parts[5..].join(" "))
        .filter(|p| p.starts_with('/'));

    Some(MappedRegion {
        region: MemoryRegion::new(start, end),
        protection,
        mapped_file,
    })
}
