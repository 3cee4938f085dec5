use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::errors::{MessengerError, Result};

/// Fill `dest` from a cryptographically secure generator.
///
/// Uses the fallible `try_fill_bytes` path so that an unavailable or
/// unseeded entropy source surfaces as [`MessengerError::RngUnavailable`]
/// instead of a panic or a silently weak buffer.
pub fn fill_from<R>(rng: &mut R, dest: &mut [u8]) -> Result<()>
where
    R: RngCore + CryptoRng + ?Sized,
{
    rng.try_fill_bytes(dest)
        .map_err(|e| MessengerError::RngUnavailable(e.to_string()))
}

/// Convenience functions over the operating system generator
pub mod random {
    use super::*;

    /// Generate a random array of specified size
    pub fn array<const N: usize>() -> Result<[u8; N]> {
        let mut array = [0u8; N];
        fill_from(&mut OsRng, &mut array)?;
        Ok(array)
    }
}
