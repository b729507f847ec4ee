use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Cow;
use tracing::debug;

/// Deterministic content source for integrity files.
///
/// Every byte is drawn from `[A-Za-z0-9]`. In plain mode the output depends
/// only on `(seed, length)`. In duplicate mode a single buffer is built from
/// the buffer seed on first use and every request is served from its prefix,
/// so files of similar size share most of their blocks.
pub struct ContentGenerator {
    duplicate: Option<DuplicateBuffer>,
}

struct DuplicateBuffer {
    seed: u64,
    initial_len: usize,
    rng: StdRng,
    data: Vec<u8>,
}

impl DuplicateBuffer {
    fn prefix(&mut self, length: usize) -> &[u8] {
        let wanted = length.max(self.initial_len);
        if self.data.len() < wanted {
            if self.data.is_empty() {
                debug!(
                    "Materializing {} byte duplicate buffer (seed {})",
                    wanted, self.seed
                );
            } else {
                debug!(
                    "Extending duplicate buffer from {} to {} bytes",
                    self.data.len(),
                    wanted
                );
            }
            let missing = wanted - self.data.len();
            self.data.reserve(missing);
            self.data
                .extend((&mut self.rng).sample_iter(Alphanumeric).take(missing));
        }
        &self.data[..length]
    }
}

impl ContentGenerator {
    pub fn plain() -> Self {
        Self { duplicate: None }
    }

    /// Duplicate mode backed by a buffer of `buffer_len` symbols drawn from `seed`.
    pub fn duplicate(seed: u64, buffer_len: usize) -> Self {
        Self {
            duplicate: Some(DuplicateBuffer {
                seed,
                initial_len: buffer_len,
                rng: StdRng::seed_from_u64(seed),
                data: Vec::new(),
            }),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate.is_some()
    }

    /// Seed of the shared buffer, if running in duplicate mode.
    pub fn duplicate_seed(&self) -> Option<u64> {
        self.duplicate.as_ref().map(|d| d.seed)
    }

    /// Produce `length` bytes for `seed`. The seed is ignored in duplicate mode.
    pub fn generate(&mut self, seed: u64, length: usize) -> Cow<'_, [u8]> {
        match self.duplicate.as_mut() {
            Some(buffer) => Cow::Borrowed(buffer.prefix(length)),
            None => Cow::Owned(generate_plain(seed, length)),
        }
    }
}

fn generate_plain(seed: u64, length: usize) -> Vec<u8> {
    StdRng::seed_from_u64(seed)
        .sample_iter(Alphanumeric)
        .take(length)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_alphanumeric(data: &[u8]) -> bool {
        data.iter().all(|b| b.is_ascii_alphanumeric())
    }

    #[test]
    fn test_zero_length_is_empty() {
        let mut generator = ContentGenerator::plain();
        assert!(generator.generate(42, 0).is_empty());

        let mut generator = ContentGenerator::duplicate(42, 1024);
        assert!(generator.generate(42, 0).is_empty());
    }

    #[test]
    fn test_plain_depends_on_seed() {
        let mut generator = ContentGenerator::plain();
        let a = generator.generate(1, 256).into_owned();
        let b = generator.generate(2, 256).into_owned();
        assert_ne!(a, b);
        assert!(is_alphanumeric(&a));
        assert!(is_alphanumeric(&b));
    }

    #[test]
    fn test_duplicate_ignores_per_file_seed() {
        let mut generator = ContentGenerator::duplicate(7, 4096);
        let a = generator.generate(1, 1000).into_owned();
        let b = generator.generate(99, 1000).into_owned();
        assert_eq!(a, b);
        assert_eq!(generator.duplicate_seed(), Some(7));
    }

    #[test]
    fn test_duplicate_buffer_extends_past_initial_length() {
        let mut generator = ContentGenerator::duplicate(3, 64);
        let short = generator.generate(0, 64).into_owned();
        let long = generator.generate(0, 200).into_owned();
        assert_eq!(long.len(), 200);
        assert_eq!(&long[..64], &short[..]);

        // A fresh generator asked for the long length first agrees.
        let mut fresh = ContentGenerator::duplicate(3, 64);
        assert_eq!(fresh.generate(0, 200).into_owned(), long);
    }

    proptest! {
        #[test]
        fn prop_plain_is_deterministic(seed in any::<u64>(), length in 0usize..4096) {
            let first = ContentGenerator::plain().generate(seed, length).into_owned();
            let second = ContentGenerator::plain().generate(seed, length).into_owned();
            prop_assert_eq!(first.len(), length);
            prop_assert!(is_alphanumeric(&first));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_duplicate_output_is_prefix(
            seed in any::<u64>(),
            a in 0usize..2048,
            b in 0usize..2048,
        ) {
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            let mut generator = ContentGenerator::duplicate(seed, 2048);
            let long_bytes = generator.generate(1, long).into_owned();
            let short_bytes = generator.generate(2, short).into_owned();
            prop_assert_eq!(&long_bytes[..short], &short_bytes[..]);
        }
    }
}
