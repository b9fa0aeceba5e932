//! File- and device-backed shared regions.
//!
//! On real hardware the shared window is exposed as a device node that is
//! mapped with `MAP_SHARED`. For simulations a regular file works the same
//! way and lets a peer process attach to it.

use std::format;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::Region;
use crate::access::ShmAccess;

/// Memory-mapped shared region.
pub struct MmapRegion {
    ptr: *mut u8,
    len: usize,
    /// Kept open for the lifetime of the mapping
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
    /// Delete the backing file on drop
    owns_file: bool,
}

impl MmapRegion {
    /// Create a zero-filled backing file of `size` bytes and map it.
    ///
    /// The file is created with permissions 0600 and removed on drop.
    pub fn create(path: &Path, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.set_len(size as u64)?;

        let ptr = map(&file, size)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            owns_file: true,
        })
    }

    /// Map `size` bytes of an existing file or device node.
    ///
    /// The size is explicit because device nodes usually report a length of
    /// zero. The node is never removed.
    pub fn open(path: &Path, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            ));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let meta = file.metadata()?;
        if meta.is_file() && (meta.len() as usize) < size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} is {} bytes, need {size}",
                    path.display(),
                    meta.len()
                ),
            ));
        }

        let ptr = map(&file, size)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            owns_file: false,
        })
    }

    /// Get a `Region` view of this mapping.
    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: the mapping is page-aligned and valid for the lifetime of self.
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    /// Path of the backing file or node.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn map(file: &File, size: usize) -> io::Result<*mut u8> {
    // SAFETY: fd is open read/write; the kernel validates size and offset.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

impl ShmAccess for MmapRegion {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn read16(&self, off: usize) -> u16 {
        self.region().read16(off)
    }

    #[inline]
    fn write16(&self, off: usize, value: u16) {
        self.region().write16(off, value)
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        self.region().read_bytes(off, dst)
    }

    fn write_bytes(&self, off: usize, src: &[u8]) {
        self.region().write_bytes(off, src)
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from a successful mmap in this value.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
        if self.owns_file {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// SAFETY: the mapping stays valid for the lifetime of the value and all
// access goes through ShmAccess, which is word-atomic for 16-bit fields.
unsafe impl Send for MmapRegion {}
// SAFETY: see above.
unsafe impl Sync for MmapRegion {}
