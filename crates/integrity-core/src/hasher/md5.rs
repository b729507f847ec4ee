use md5::{Digest, Md5};
use std::io::{self, Read};

/// Lowercase hex MD5 of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn hash_str(data: &str) -> String {
    hash_bytes(data.as_bytes())
}

/// Streams `reader` through MD5 in `chunk_size` reads.
///
/// Returns the hex digest together with the number of bytes consumed so the
/// caller can cross-check the length it saw against what it expected.
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<(String, u64)> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}
