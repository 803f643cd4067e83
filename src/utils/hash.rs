//! Hashing helpers.
//!
//! - `fingerprint`: FxHash of rendered HTML, sent to clients so they can
//!   skip re-rendering unchanged blocks
//! - `digest_hex`: blake3 of canonical bibliography input, used as `bibid`
//!
//! # Usage
//!
//! ```ignore
//! use crate::utils::hash;
//!
//! let h = hash::compute("<p>hi</p>"); // -> u64
//! let fp = hash::fingerprint("<p>hi</p>"); // -> "a1b2c3d4e5f60718"
//! ```

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Compute 64-bit hash from byte data.
#[inline]
pub fn compute<T: AsRef<[u8]> + ?Sized>(data: &T) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_ref());
    hasher.finish()
}

/// Compute hash and return as 16-char hex fingerprint.
///
/// Hex rather than a JSON number: browsers lose precision above 2^53.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    format!("{:016x}", compute(value))
}

/// blake3 digest truncated to 16 hex chars.
pub fn digest_hex<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    let hash = blake3::hash(value.as_ref());
    hex::encode(&hash.as_bytes()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable_and_sized() {
        let a = fingerprint("<p>one</p>");
        assert_eq!(a, fingerprint("<p>one</p>"));
        assert_ne!(a, fingerprint("<p>two</p>"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_digest_hex() {
        let d = digest_hex(b"bibliography");
        assert_eq!(d.len(), 16);
        assert_eq!(d, digest_hex("bibliography"));
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
