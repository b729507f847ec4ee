pub mod md5;

pub use self::md5::{hash_bytes, hash_reader, hash_str};
