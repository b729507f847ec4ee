use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, trace};
use walkdir::WalkDir;

/// Marker every integrity file name carries, with or without a suffix.
const INTEGRITY_MARKER: &str = ":integrity";

/// Regular files directly inside `directory` whose names look like integrity
/// files, sorted by name. Symlinks and subdirectories are skipped.
pub fn find_integrity_files(directory: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied while scanning {}: {}", directory.display(), err);
                    continue;
                }
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Error scanning {}: {}", directory.display(), err),
                ));
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let is_integrity = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.contains(INTEGRITY_MARKER));
        if is_integrity {
            found.push(entry.into_path());
        } else {
            trace!("Skipping {}", entry.path().display());
        }
    }

    Ok(found)
}
