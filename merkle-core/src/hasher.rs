//! Hash strategy selection
//!
//! A [`HashStrategy`] is a named factory of fresh [`Accumulator`]s. Every
//! digest the tree computes starts from a new accumulator; `finish` consumes
//! the accumulator so state can never leak from one hash into the next.

use crate::{Error, Result};
use digest::Digest;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

/// Prefix of every leaf digest
pub const LEAF_PREFIX: u8 = 0x00;

/// Prefix of every interior node digest
pub const INTERIOR_PREFIX: u8 = 0x01;

/// Append-write digest state
pub trait Accumulator: Send {
    /// Append bytes to the digest input
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Finalize into a fixed-width digest
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// Adapter from any RustCrypto [`Digest`] to [`Accumulator`]
struct DigestAccumulator<D>(D);

impl<D: Digest + Send> Accumulator for DigestAccumulator<D> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        Digest::update(&mut self.0, bytes);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        let DigestAccumulator(digest) = *self;
        digest.finalize().to_vec()
    }
}

type Factory = dyn Fn() -> Box<dyn Accumulator> + Send + Sync;

/// Named factory of digest accumulators
#[derive(Clone)]
pub struct HashStrategy {
    name: Arc<str>,
    factory: Arc<Factory>,
}

impl HashStrategy {
    /// Wrap a caller-supplied factory
    ///
    /// The factory is invoked once per hash computation and must return an
    /// accumulator in its initial state every time.
    pub fn new<F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Accumulator> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Strategy backed by any [`Digest`] implementation
    pub fn digest<D>(name: &str) -> Self
    where
        D: Digest + Send + 'static,
    {
        Self::new(name, || -> Box<dyn Accumulator> {
            Box::new(DigestAccumulator(D::new()))
        })
    }

    /// SHA-256 (the default)
    pub fn sha256() -> Self {
        Self::digest::<sha2::Sha256>("sha256")
    }

    /// SHA-1
    pub fn sha1() -> Self {
        Self::digest::<sha1::Sha1>("sha1")
    }

    /// MD5
    pub fn md5() -> Self {
        Self::digest::<md5::Md5>("md5")
    }

    /// Strategy name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh accumulator
    pub fn accumulator(&self) -> Box<dyn Accumulator> {
        (self.factory)()
    }

    /// Untagged digest of `data`
    pub fn hash(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut acc = self.accumulator();
        acc.write(data)?;
        Ok(acc.finish())
    }

    /// Tagged leaf digest: `0x00 ‖ H(payload)`
    pub fn leaf_hash(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(tagged(LEAF_PREFIX, self.hash(payload)?))
    }

    /// Tagged interior digest: `0x01 ‖ H(left ‖ right)`
    pub fn interior_hash(&self, left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
        let mut acc = self.accumulator();
        acc.write(left)?;
        acc.write(right)?;
        Ok(tagged(INTERIOR_PREFIX, acc.finish()))
    }
}

fn tagged(prefix: u8, digest: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(digest.len() + 1);
    out.push(prefix);
    out.extend_from_slice(&digest);
    out
}

impl Default for HashStrategy {
    fn default() -> Self {
        Self::sha256()
    }
}

impl fmt::Debug for HashStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashStrategy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FromStr for HashStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::sha256()),
            "sha1" => Ok(Self::sha1()),
            "md5" => Ok(Self::md5()),
            _ => Err(Error::UnsupportedHashAlgorithm(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RejectingAccumulator;

    impl Accumulator for RejectingAccumulator {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "accumulator offline"))
        }

        fn finish(self: Box<Self>) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn test_sha256_empty_digest() {
        let digest = HashStrategy::sha256().hash(b"").unwrap();
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_leaf_hash_is_tagged() {
        let leaf = HashStrategy::sha256().leaf_hash(b"inputA").unwrap();
        assert_eq!(leaf[0], LEAF_PREFIX);
        assert_eq!(
            hex::encode(&leaf),
            "003df26252b79cbbec76756cefc5bb3125df63180ce737c06f92bd4afbcc6d34f3"
        );
    }

    #[test]
    fn test_interior_hash_is_tagged() {
        let strategy = HashStrategy::sha256();
        let a = strategy.leaf_hash(b"inputA").unwrap();
        let b = strategy.leaf_hash(b"inputB").unwrap();
        let ab = strategy.interior_hash(&a, &b).unwrap();
        assert_eq!(
            hex::encode(ab),
            "014b2aab6bded4698071f17454b66940a19e67a9f3a70c3a91a811410b0c617c31"
        );
    }

    #[test]
    fn test_fresh_accumulator_per_hash() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let strategy = HashStrategy::new("counted-sha256", move || -> Box<dyn Accumulator> {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::new(DigestAccumulator(sha2::Sha256::new()))
        });

        let first = strategy.hash(b"payload").unwrap();
        let second = strategy.hash(b"payload").unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_write_failure_surfaces_verbatim() {
        let strategy = HashStrategy::new("rejecting", || -> Box<dyn Accumulator> {
            Box::new(RejectingAccumulator)
        });

        let err = strategy.leaf_hash(b"inputA").unwrap_err();
        assert!(matches!(err, Error::HashWriteFailed(_)));
        assert_eq!(err.to_string(), "accumulator offline");
    }

    #[test]
    fn test_digest_widths() {
        assert_eq!(HashStrategy::sha256().hash(b"x").unwrap().len(), 32);
        assert_eq!(HashStrategy::sha1().hash(b"x").unwrap().len(), 20);
        assert_eq!(HashStrategy::md5().hash(b"x").unwrap().len(), 16);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("sha256".parse::<HashStrategy>().unwrap().name(), "sha256");
        assert_eq!("SHA-256".parse::<HashStrategy>().unwrap().name(), "sha256");
        assert_eq!("sha1".parse::<HashStrategy>().unwrap().name(), "sha1");
        assert_eq!("MD5".parse::<HashStrategy>().unwrap().name(), "md5");

        let err = "whirlpool".parse::<HashStrategy>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedHashAlgorithm(name) if name == "whirlpool"));
    }

    #[test]
    fn test_default_is_sha256() {
        assert_eq!(HashStrategy::default().name(), "sha256");
    }
}
