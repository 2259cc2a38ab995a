//! On-disk entry naming.
//!
//! Entry directories are named by a 32-bit polynomial hash of the normalized
//! request, computed over UTF-16 code units with multiplier 31 and printed as
//! a signed decimal. Distinct requests can collide; the metadata record keeps
//! the full request so a colliding lookup is answered as a miss.

use std::fmt;

use crate::proxy::request::NormalizedRequest;

/// Hash-derived name of a cache entry directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(i32);

impl CacheKey {
    pub fn for_request(request: &NormalizedRequest) -> Self {
        Self(string_hash(request.as_str()))
    }

    /// Parse a directory name back into a key.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.parse().ok().map(Self)
    }

    pub fn dir_name(&self) -> String {
        self.0.to_string()
    }

    /// Stripe index for lock tables of `stripes` slots.
    pub fn stripe(&self, stripes: usize) -> usize {
        (self.0 as u32 as usize) % stripes.max(1)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}
