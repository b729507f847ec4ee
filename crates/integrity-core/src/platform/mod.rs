#[cfg(unix)]
pub mod unix;

use std::io;
use std::path::Path;

/// Capacity and space available to unprivileged writers, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
}

/// Source of filesystem usage figures for the session's directory.
pub trait SpaceProbe {
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// Asks the operating system via `statvfs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl SpaceProbe for StatvfsProbe {
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        unix::statvfs_usage(path)
    }
}

#[cfg(not(unix))]
impl SpaceProbe for StatvfsProbe {
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("disk usage is not available for {}", path.display()),
        ))
    }
}

/// True when `err` means the filesystem, or the user's quota, has no room left.
#[cfg(unix)]
pub fn is_storage_full(err: &io::Error) -> bool {
    unix::is_storage_full(err)
}

#[cfg(not(unix))]
pub fn is_storage_full(_err: &io::Error) -> bool {
    false
}

impl<P: SpaceProbe + ?Sized> SpaceProbe for &P {
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        (**self).disk_usage(path)
    }
}

impl<P: SpaceProbe + ?Sized> SpaceProbe for Box<P> {
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        (**self).disk_usage(path)
    }
}
