//! FileSource — response bodies for the static responder
//!
//! The connection layer never touches the filesystem directly; it asks a
//! `FileSource` for the size of a target (the `Content-Length` it will
//! advertise) and, for GET, the bytes. `None` from either call becomes a
//! 404 on the wire.
//!
//! [`DiskSource`] is the production implementation: `stat` for the size,
//! `open` + `mmap` + copy + `munmap` for the bytes, with targets joined
//! verbatim under a root directory (default the working directory — no
//! normalization, no sandboxing).

use std::ffi::CString;
use std::path::PathBuf;

/// Where response bodies come from. Implementations must be callable from
/// any reactor thread.
pub trait FileSource: Send + Sync {
    /// Byte size of `target`, or `None` when it cannot be found.
    fn len(&self, target: &str) -> Option<u64>;

    /// Full contents of `target`, or `None` when it cannot be read.
    fn read(&self, target: &str) -> Option<Vec<u8>>;
}

/// Serves files from a root directory via stat + mmap.
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, target: &str) -> Option<CString> {
        let path = self.root.join(target);
        CString::new(path.to_str()?).ok()
    }
}

impl FileSource for DiskSource {
    fn len(&self, target: &str) -> Option<u64> {
        let path = self.resolve(target)?;
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::stat(path.as_ptr(), &mut st) };
        if ret < 0 {
            return None;
        }
        Some(st.st_size as u64)
    }

    fn read(&self, target: &str) -> Option<Vec<u8>> {
        let path = self.resolve(target)?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return None;
        }

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } < 0 {
            unsafe { libc::close(fd) };
            return None;
        }
        let size = st.st_size as usize;
        if size == 0 {
            // Zero-length mappings are EINVAL.
            unsafe { libc::close(fd) };
            return None;
        }

        let mapped = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mapped == libc::MAP_FAILED {
            return None;
        }

        let bytes =
            unsafe { std::slice::from_raw_parts(mapped as *const u8, size) }.to_vec();
        unsafe { libc::munmap(mapped, size) };
        Some(bytes)
    }
}

/// In-memory source for exercising the responder without a filesystem.
#[cfg(test)]
pub(crate) struct MemSource {
    files: std::collections::HashMap<String, Vec<u8>>,
}

#[cfg(test)]
impl MemSource {
    pub(crate) fn new() -> Self {
        Self {
            files: std::collections::HashMap::new(),
        }
    }

    pub(crate) fn with(mut self, target: &str, bytes: &[u8]) -> Self {
        self.files.insert(target.to_string(), bytes.to_vec());
        self
    }
}

#[cfg(test)]
impl FileSource for MemSource {
    fn len(&self, target: &str) -> Option<u64> {
        self.files.get(target).map(|b| b.len() as u64)
    }

    fn read(&self, target: &str) -> Option<Vec<u8>> {
        self.files.get(target).cloned()
    }
}
