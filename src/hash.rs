pub trait Hasher {
    type Digest;
    fn reset(&mut self);
    fn update(&mut self, input: &[u8]);
    fn finalize_reset(&mut self) -> Self::Digest;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sha256Digest(pub [u8; 32]);

#[cfg(feature = "sha2")]
mod sha {
    use sha2::{Digest, Sha256};

    use super::{Hasher, Sha256Digest};

    #[derive(Default)]
    pub struct Sha256Hasher {
        inner: Sha256,
    }

    impl Sha256Hasher {
        pub fn new() -> Self {
            Self {
                inner: Sha256::new(),
            }
        }
    }

    impl Hasher for Sha256Hasher {
        type Digest = Sha256Digest;

        fn reset(&mut self) {
            Digest::reset(&mut self.inner);
        }

        fn update(&mut self, input: &[u8]) {
            Digest::update(&mut self.inner, input);
        }

        fn finalize_reset(&mut self) -> Self::Digest {
            Sha256Digest(self.inner.finalize_reset().into())
        }
    }
}

#[cfg(feature = "sha2")]
pub use sha::Sha256Hasher;

/// The implicit digest of a packet is the SHA-256 of its complete wire encoding.
///
/// Without the `sha2` feature no digest is computed, and full-name matching is disabled.
pub fn implicit_digest(wire: &[u8]) -> Option<Sha256Digest> {
    #[cfg(feature = "sha2")]
    {
        let mut hasher = Sha256Hasher::new();
        hasher.update(wire);
        Some(hasher.finalize_reset())
    }

    #[cfg(not(feature = "sha2"))]
    {
        let _ = wire;
        None
    }
}

#[cfg(all(test, feature = "sha2"))]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = implicit_digest(b"abc").unwrap();
        assert_eq!(
            digest.0[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
        assert_eq!(digest.0[28..], [0xf2, 0x00, 0x15, 0xad]);
    }

    #[test]
    fn test_hasher_resets() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"garbage");
        hasher.reset();
        hasher.update(b"abc");
        let first = hasher.finalize_reset();
        hasher.update(b"abc");
        assert_eq!(first, hasher.finalize_reset());
    }
}
