//! Centralized limits for the table engine and the chunk loader.
//!
//! Mirrors the `luaconf.h` / `llimits.h` knobs the core depends on.
//! All magic numbers that bound table growth and chunk loading are collected here.

// ===== Tables =====

/// Maximum bit width of the hash part: a hash part holds at most 2^MAXBITS nodes.
pub const MAXBITS: u32 = 30;

/// Maximum bit width of the array part: the array part holds at most 2^MAXABITS slots.
/// Integer keys above this are always kept in the hash part.
pub const MAXABITS: u32 = 26;

/// Largest array part size, and the largest integer key eligible for it.
pub const MAXASIZE: usize = 1 << MAXABITS;

/// Overflow guard used by the length probe before it falls back to a linear scan.
pub const MAX_INT: u64 = i32::MAX as u64;

// ===== Strings =====

/// Maximum length for "short" strings (interned, hashed eagerly).
pub const LUAI_MAXSHORTLEN: usize = 40;

// ===== Chunk loading =====

/// Maximum nesting of function prototypes accepted from a precompiled chunk.
pub const LUAI_MAXCCALLS: usize = 200;
