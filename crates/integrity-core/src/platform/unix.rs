use super::DiskUsage;
use nix::errno::Errno;
use nix::sys::statvfs::statvfs;
use std::io;
use std::path::Path;

/// `total = f_blocks * f_frsize`, `free = f_bavail * f_frsize`.
#[allow(clippy::unnecessary_cast)]
pub fn statvfs_usage(path: &Path) -> io::Result<DiskUsage> {
    let stat = statvfs(path).map_err(|errno| {
        io::Error::new(
            io::Error::from(errno).kind(),
            format!("statvfs {}: {}", path.display(), errno.desc()),
        )
    })?;

    let fragment = stat.fragment_size() as u64;
    Ok(DiskUsage {
        total: (stat.blocks() as u64).saturating_mul(fragment),
        free: (stat.blocks_available() as u64).saturating_mul(fragment),
    })
}

/// `ENOSPC` or `EDQUOT`.
pub fn is_storage_full(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => code == Errno::ENOSPC as i32 || code == Errno::EDQUOT as i32,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_statvfs_reports_sane_values() {
        let dir = tempdir().unwrap();
        let usage = statvfs_usage(dir.path()).unwrap();
        assert!(usage.total > 0);
        assert!(usage.free <= usage.total);
    }

    #[test]
    fn test_statvfs_missing_path_errors() {
        let dir = tempdir().unwrap();
        let err = statvfs_usage(&dir.path().join("does-not-exist")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_storage_full_classification() {
        assert!(is_storage_full(&io::Error::from(Errno::ENOSPC)));
        assert!(is_storage_full(&io::Error::from(Errno::EDQUOT)));
        assert!(!is_storage_full(&io::Error::from(Errno::EIO)));
        assert!(!is_storage_full(&io::Error::new(io::ErrorKind::Other, "no errno")));
    }
}
