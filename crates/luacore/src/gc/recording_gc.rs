use super::{BlockKind, Gc, GcHost, GcOwner};
use crate::lua_value::{LuaString, LuaValue};
use crate::{LuaResult, SafeOption};

/// One observed collaborator call
#[derive(Debug, Clone, PartialEq)]
pub enum GcEvent {
    Alloc { kind: BlockKind, count: usize },
    Realloc { kind: BlockKind, old: usize, new: usize },
    Free { kind: BlockKind, count: usize },
    Barrier { owner: &'static str, value: LuaValue },
    String { len: usize },
}

/// Collaborator that forwards to `Gc` and keeps a log of every call
#[derive(Default)]
pub struct RecordingGc {
    inner: Gc,
    events: Vec<GcEvent>,
}

impl RecordingGc {
    pub fn new(option: SafeOption) -> Self {
        Self {
            inner: Gc::new(option),
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[GcEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn inner(&self) -> &Gc {
        &self.inner
    }

    /// Number of calls that grew a block of `kind` (fresh allocations included)
    pub fn growths(&self, kind: BlockKind) -> usize {
        self.events
            .iter()
            .filter(|e| match **e {
                GcEvent::Alloc { kind: k, count } => k == kind && count > 0,
                GcEvent::Realloc { kind: k, old, new } => k == kind && new > old,
                _ => false,
            })
            .count()
    }

    pub fn barriers(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, GcEvent::Barrier { .. }))
            .count()
    }
}

impl GcHost for RecordingGc {
    fn alloc_block(&mut self, kind: BlockKind, count: usize) -> LuaResult<()> {
        self.inner.alloc_block(kind, count)?;
        self.events.push(GcEvent::Alloc { kind, count });
        Ok(())
    }

    fn realloc_block(&mut self, kind: BlockKind, old: usize, new: usize) -> LuaResult<()> {
        self.inner.realloc_block(kind, old, new)?;
        self.events.push(GcEvent::Realloc { kind, old, new });
        Ok(())
    }

    fn free_block(&mut self, kind: BlockKind, count: usize) {
        self.inner.free_block(kind, count);
        self.events.push(GcEvent::Free { kind, count });
    }

    fn barrier_back(&mut self, owner: GcOwner<'_>, value: &LuaValue) {
        self.inner.barrier_back(owner, value);
        self.events.push(GcEvent::Barrier {
            owner: owner.name(),
            value: value.clone(),
        });
    }

    fn create_string(&mut self, bytes: &[u8]) -> LuaResult<LuaString> {
        let s = self.inner.create_string(bytes)?;
        self.events.push(GcEvent::String { len: bytes.len() });
        Ok(s)
    }
}
