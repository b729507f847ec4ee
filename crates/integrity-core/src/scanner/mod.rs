pub mod walk;

pub use walk::find_integrity_files;
