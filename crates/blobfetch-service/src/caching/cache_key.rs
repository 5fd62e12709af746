use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::CacheName;

/// The key under which an item is stored in a [`Cacher`](super::Cacher).
///
/// Keys are compared by the SHA-256 digest of their metadata.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl CacheKey {
    /// Create a [`CacheKeyBuilder`] for an item of the given cache.
    pub fn builder(name: CacheName) -> CacheKeyBuilder {
        CacheKeyBuilder {
            metadata: format!("cache: {name}\n"),
        }
    }

    /// Returns the human-readable metadata that forms the basis of the [`CacheKey`].
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    #[cfg(test)]
    pub fn for_testing(key: impl Into<String>) -> Self {
        CacheKeyBuilder {
            metadata: key.into(),
        }
        .build()
    }
}

/// A builder for [`CacheKey`]s.
///
/// The builder accepts human readable, but most importantly **stable**, input.
/// This input in then being hashed to form the [`CacheKey`], and is kept alongside it to help
/// debugging.
///
/// Use [`field`](Self::field) for free-form string values: they are written quoted and escaped,
/// so that a value can never be confused with the separators around it.
pub struct CacheKeyBuilder {
    metadata: String,
}

impl CacheKeyBuilder {
    /// Writes a `name: "value"` line with the value escaped.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        writeln!(self.metadata, "{name}: {value:?}").unwrap();
        self
    }

    /// Writes a `name: value` line for a value with a fixed, unambiguous representation.
    pub fn value(mut self, name: &str, value: impl fmt::Display) -> Self {
        writeln!(self.metadata, "{name}: {value}").unwrap();
        self
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let hash = Sha256::digest(&self.metadata);
        CacheKey {
            metadata: self.metadata.into(),
            hash: hash.into(),
        }
    }
}
