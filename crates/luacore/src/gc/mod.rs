// Allocator / collector collaborator
//
// The table engine and the chunk loader never own a collector. Every block they
// grow, shrink or release is announced through `GcHost` first, and every heap
// reference they store into a table or prototype is reported with a backward
// barrier so an incremental collector can re-gray the owner.
//
// Contract:
// - `alloc_block` / `realloc_block` are called BEFORE the structure changes, so a
//   refusal (`LuaError::OutOfMemory`) leaves the caller's object untouched.
// - `barrier_back` is only raised for collectable values.
// - Short strings belong to the interner. A long string is charged to the object
//   that stores it, which gives it back with `free_block(StringBytes, len)`.
// - The host may run a collection inside any of these calls; callers never expose
//   a half-initialized object while calling out.

mod gc_id;
mod recording_gc;
mod string_interner;

pub use gc_id::{GcId, GcKind};
pub use recording_gc::{GcEvent, RecordingGc};
pub use string_interner::StringInterner;

use crate::lua_value::lua_table::Node;
use crate::lua_value::{LocVar, LuaString, LuaTable, LuaValue, Proto, UpvalueDesc};
use crate::lua_vm::lua_limits::LUAI_MAXSHORTLEN;
use crate::{Instruction, LuaError, LuaResult, SafeOption};
use std::rc::Rc;

/// Kinds of memory blocks the core asks its host for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Table array part (one `LuaValue` per slot)
    ArrayPart,
    /// Table hash part (one node per slot)
    HashPart,
    /// A function prototype header
    Proto,
    Code,
    Constants,
    /// Nested prototype list of a prototype
    Protos,
    Upvalues,
    LineInfo,
    LocVars,
    StringBytes,
}

impl BlockKind {
    /// Bytes accounted per element of this block
    pub fn element_size(self) -> usize {
        match self {
            BlockKind::ArrayPart | BlockKind::Constants => size_of::<LuaValue>(),
            BlockKind::HashPart => size_of::<Node>(),
            BlockKind::Proto => size_of::<Proto>(),
            BlockKind::Code => size_of::<Instruction>(),
            BlockKind::Protos => size_of::<Rc<Proto>>(),
            BlockKind::Upvalues => size_of::<UpvalueDesc>(),
            BlockKind::LineInfo => size_of::<i32>(),
            BlockKind::LocVars => size_of::<LocVar>(),
            BlockKind::StringBytes => 1,
        }
    }
}

/// The object a barrier is raised on
#[derive(Clone, Copy)]
pub enum GcOwner<'a> {
    Table(&'a LuaTable),
    Proto(&'a Proto),
}

impl GcOwner<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            GcOwner::Table(_) => "table",
            GcOwner::Proto(_) => "proto",
        }
    }
}

/// Host services consumed by the table engine and the loader
pub trait GcHost {
    /// Account a fresh block of `count` elements
    fn alloc_block(&mut self, kind: BlockKind, count: usize) -> LuaResult<()>;

    /// Account a block changing from `old` to `new` elements, prefix preserved
    fn realloc_block(&mut self, kind: BlockKind, old: usize, new: usize) -> LuaResult<()>;

    /// Release a block of `count` elements
    fn free_block(&mut self, kind: BlockKind, count: usize);

    /// A collectable `value` was stored into `owner`
    fn barrier_back(&mut self, owner: GcOwner<'_>, value: &LuaValue);

    /// Create a string: short strings come back interned, long strings are charged to the caller
    fn create_string(&mut self, bytes: &[u8]) -> LuaResult<LuaString>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcStats {
    pub allocations: usize,
    pub reallocations: usize,
    pub frees: usize,
    pub barriers: usize,
    pub strings_created: usize,
    pub refused: usize,
}

/// Default collaborator: byte accounting against `SafeOption::max_memory_limit` plus the string interner
pub struct Gc {
    option: SafeOption,
    total_bytes: isize,
    strings: StringInterner,
    stats: GcStats,
}

impl Default for Gc {
    fn default() -> Self {
        Self::new(SafeOption::default())
    }
}

impl Gc {
    pub fn new(option: SafeOption) -> Self {
        let strings = StringInterner::new(option.string_seed);
        Self {
            option,
            total_bytes: 0,
            strings,
            stats: GcStats::default(),
        }
    }

    #[inline(always)]
    pub fn total_bytes(&self) -> isize {
        self.total_bytes
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    /// Drop interned strings that are no longer referenced outside the interner
    pub fn sweep_strings(&mut self) {
        let released = self.strings.remove_unreferenced();
        self.total_bytes -= released as isize;
    }

    fn charge(&mut self, bytes: isize) -> LuaResult<()> {
        if bytes > 0 && self.total_bytes.saturating_add(bytes) > self.option.max_memory_limit {
            self.stats.refused += 1;
            log::trace!(
                "allocation of {} bytes refused ({} in use, limit {})",
                bytes,
                self.total_bytes,
                self.option.max_memory_limit
            );
            return Err(LuaError::OutOfMemory);
        }
        self.total_bytes += bytes;
        Ok(())
    }
}

fn block_bytes(kind: BlockKind, count: usize) -> isize {
    count.saturating_mul(kind.element_size()).min(isize::MAX as usize) as isize
}

impl GcHost for Gc {
    fn alloc_block(&mut self, kind: BlockKind, count: usize) -> LuaResult<()> {
        self.charge(block_bytes(kind, count))?;
        self.stats.allocations += 1;
        log::trace!("alloc {:?} x{}", kind, count);
        Ok(())
    }

    fn realloc_block(&mut self, kind: BlockKind, old: usize, new: usize) -> LuaResult<()> {
        self.charge(block_bytes(kind, new) - block_bytes(kind, old))?;
        self.stats.reallocations += 1;
        log::trace!("realloc {:?} {} -> {}", kind, old, new);
        Ok(())
    }

    fn free_block(&mut self, kind: BlockKind, count: usize) {
        self.total_bytes -= block_bytes(kind, count);
        self.stats.frees += 1;
        log::trace!("free {:?} x{}", kind, count);
    }

    fn barrier_back(&mut self, _owner: GcOwner<'_>, _value: &LuaValue) {
        self.stats.barriers += 1;
    }

    fn create_string(&mut self, bytes: &[u8]) -> LuaResult<LuaString> {
        if bytes.len() <= LUAI_MAXSHORTLEN {
            if let Some(s) = self.strings.find(bytes) {
                return Ok(s);
            }
            self.charge(block_bytes(BlockKind::StringBytes, bytes.len()))?;
            let (s, _) = self.strings.intern(bytes);
            self.stats.strings_created += 1;
            Ok(s)
        } else {
            self.charge(block_bytes(BlockKind::StringBytes, bytes.len()))?;
            self.stats.strings_created += 1;
            Ok(LuaString::new_long(bytes, self.strings.seed()))
        }
    }
}
