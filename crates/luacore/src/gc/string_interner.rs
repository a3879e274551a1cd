use ahash::RandomState;
use std::collections::HashMap;

use crate::lua_value::LuaString;
use crate::lua_value::lua_string::content_hash;
use crate::lua_vm::lua_limits::LUAI_MAXSHORTLEN;

/// Short string interner
/// - Same content always returns the same `LuaString` (identity equality for short strings)
/// - Long strings are never interned; they get a lazily computed hash instead
pub struct StringInterner {
    // Content hash -> strings with that hash
    map: HashMap<u64, Vec<LuaString>, RandomState>,
    seed: u64,
}

impl StringInterner {
    pub fn new(seed: u64) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(256, RandomState::new()),
            seed,
        }
    }

    #[inline(always)]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Look up an already interned short string
    pub fn find(&self, bytes: &[u8]) -> Option<LuaString> {
        if bytes.len() > LUAI_MAXSHORTLEN {
            return None;
        }
        let hash = content_hash(self.seed, bytes);
        self.map
            .get(&hash)?
            .iter()
            .find(|s| s.as_bytes() == bytes)
            .cloned()
    }

    /// Intern a short string, returning the existing instance when the content is already known.
    /// The flag is true when a new string was created.
    pub fn intern(&mut self, bytes: &[u8]) -> (LuaString, bool) {
        debug_assert!(bytes.len() <= LUAI_MAXSHORTLEN);
        let hash = content_hash(self.seed, bytes);
        let bucket = self.map.entry(hash).or_default();
        if let Some(s) = bucket.iter().find(|s| s.as_bytes() == bytes) {
            return (s.clone(), false);
        }
        let s = LuaString::new_short(bytes, hash);
        bucket.push(s.clone());
        (s, true)
    }

    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop strings nobody outside the interner references any more.
    /// Returns the number of bytes released.
    pub fn remove_unreferenced(&mut self) -> usize {
        let mut released = 0;
        self.map.retain(|_, bucket| {
            bucket.retain(|s| {
                let dead = s.ref_count() == 1;
                if dead {
                    released += s.len();
                }
                !dead
            });
            !bucket.is_empty()
        });
        released
    }
}
