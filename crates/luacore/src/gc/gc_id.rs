// ============ Object IDs ============
// Heap objects are owned by the host collector and referenced by compact handles

/// Object type tags for heap references
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcKind {
    Table = 0,
    Function = 1,
    Userdata = 2,
    Thread = 3,
}

/// Unified heap object identifier: a kind tag plus a slot index inside the host's object pool
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GcId {
    kind: GcKind,
    index: u32,
}

impl GcId {
    #[inline(always)]
    pub const fn new(kind: GcKind, index: u32) -> Self {
        Self { kind, index }
    }

    #[inline(always)]
    pub fn kind(self) -> GcKind {
        self.kind
    }

    #[inline(always)]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Pointer-like bit pattern, used where the table hashes object identity
    #[inline(always)]
    pub fn raw_bits(self) -> usize {
        ((self.kind as usize) << 29) ^ self.index as usize
    }
}
