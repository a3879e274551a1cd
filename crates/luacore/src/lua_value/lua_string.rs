use ahash::RandomState;
use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::lua_vm::lua_limits::LUAI_MAXSHORTLEN;

/// Seeded content hash shared by the interner and lazily hashed long strings
pub(crate) fn content_hash(seed: u64, bytes: &[u8]) -> u64 {
    RandomState::with_seeds(
        seed,
        seed.rotate_left(23) ^ 0x9e37_79b9_7f4a_7c15,
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
    )
    .hash_one(bytes)
}

struct StringData {
    bytes: Box<[u8]>,
    short: bool,
    /// Content hash; for a long string not yet hashed this holds the seed
    hash: Cell<u64>,
    hashed: Cell<bool>,
}

/// Immutable shared Lua string.
///
/// Short strings (up to `LUAI_MAXSHORTLEN` bytes) only come out of the interner, so two
/// equal short strings are the same allocation and compare by identity. Long strings are
/// compared by content and hashed the first time a table needs their hash.
#[derive(Clone)]
pub struct LuaString(Rc<StringData>);

impl LuaString {
    pub(crate) fn new_short(bytes: &[u8], hash: u64) -> Self {
        debug_assert!(bytes.len() <= LUAI_MAXSHORTLEN);
        Self(Rc::new(StringData {
            bytes: bytes.into(),
            short: true,
            hash: Cell::new(hash),
            hashed: Cell::new(true),
        }))
    }

    pub(crate) fn new_long(bytes: &[u8], seed: u64) -> Self {
        Self(Rc::new(StringData {
            bytes: bytes.into(),
            short: false,
            hash: Cell::new(seed),
            hashed: Cell::new(false),
        }))
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    #[inline(always)]
    pub fn is_short(&self) -> bool {
        self.0.short
    }

    /// Content hash, computed on first use for long strings
    #[inline]
    pub fn hash(&self) -> u64 {
        if !self.0.hashed.get() {
            let seed = self.0.hash.get();
            self.0.hash.set(content_hash(seed, &self.0.bytes));
            self.0.hashed.set(true);
        }
        self.0.hash.get()
    }

    pub fn is_hashed(&self) -> bool {
        self.0.hashed.get()
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &LuaString) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0.bytes)
    }
}

impl PartialEq for LuaString {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_short(), other.is_short()) {
            (true, true) => self.ptr_eq(other),
            (false, false) => self.ptr_eq(other) || self.as_bytes() == other.as_bytes(),
            _ => false,
        }
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}
