use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng, TryRngCore};

use crate::Error;

/// Source of cryptographically secure random bytes.
///
/// Implementations must be backed by a CSPRNG. Failure to gather entropy is
/// reported as [`Error::KeyGeneration`] and must never be papered over.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), Error>;
}

/// Randomness straight from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), Error> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|err| Error::KeyGeneration(format!("operating system rng failed: {err}")))
    }
}

/// Deterministic ChaCha-based generator.
///
/// Only suitable for reproducible test vectors: anyone who knows the seed
/// can recompute every key it produced.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_seed(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), Error> {
        self.rng.lock().fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_randomness() {
        let sample = |seed| {
            let random = SeededRandom::from_seed(seed);
            let mut out = [0u8; 64];
            random.fill_bytes(&mut out).unwrap();
            out
        };

        assert_eq!(sample([1; 32]), sample([1; 32]));
        assert_ne!(sample([1; 32]), sample([2; 32]));
    }

    #[test]
    fn test_os_random_fills_buffer() {
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        OsRandom.fill_bytes(&mut first).unwrap();
        OsRandom.fill_bytes(&mut second).unwrap();

        assert_ne!(first, second);
        assert!(!first.iter().all(|&b| b == 0));
    }
}
