//! Key generator (component D): deterministic SHA-256 fingerprint of
//! command text + parameters, grounded in the teacher's `CacheKey::from_sql`
//! (`src/cache/query_cache.rs`) but extended to cover parameters, since the
//! specification requires parameter-sensitive fingerprints.

use crate::driver::Command;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// `<prefix><lowercase-hex-sha256>` fingerprint string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constructs a fingerprint from an already-computed string, e.g. one
    /// built by [`KeyGenerator::fingerprint`] or read back off the wire.
    /// Bypasses hashing; callers outside this module should normally go
    /// through [`KeyGenerator`] instead.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Fingerprint(value.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces fingerprints under a configurable key prefix.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Canonicalization rule (spec.md §4.D): the text followed, for each
    /// parameter in declared order, by `"|<param-name>=<param-value-or-
    /// NULL>:<declared-type>"`.
    fn canonicalize(&self, command: &Command) -> String {
        let mut buf = String::with_capacity(command.text.len() + command.parameters.len() * 32);
        buf.push_str(&command.text);
        for param in &command.parameters {
            buf.push('|');
            buf.push_str(&param.name);
            buf.push('=');
            match &param.value {
                Some(v) => buf.push_str(&v.to_invariant_string()),
                None => buf.push_str("NULL"),
            }
            buf.push(':');
            buf.push_str(&param.declared_type);
        }
        buf
    }

    /// Deterministic fingerprint: same command text + parameters always
    /// produces the same fingerprint; any textual or parameter difference
    /// produces a different one.
    pub fn fingerprint(&self, command: &Command) -> Fingerprint {
        let canonical = self.canonicalize(command);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        Fingerprint(format!("{}{}", self.prefix, hex::encode(digest)))
    }
}
