use std::cell::RefCell;
use std::rc::Rc;

use super::{LuaString, LuaValue};
use crate::Instruction;
use crate::gc::{BlockKind, GcHost};

/// Upvalue descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpvalueDesc {
    pub is_local: bool, // true if captures a parent register, false if a parent upvalue
    pub index: u8,      // index in parent's register or upvalue array
    pub name: Option<LuaString>,
}

/// Local variable debug descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocVar {
    pub name: Option<LuaString>,
    pub start_pc: i32, // first point where variable is active
    pub end_pc: i32,   // first point where variable is dead
}

/// Function prototype loaded from a precompiled chunk
#[derive(Debug, Clone, Default)]
pub struct Proto {
    pub code: Vec<Instruction>,
    pub constants: Vec<LuaValue>, // nil, boolean, number or string only
    pub child_protos: Vec<Rc<Proto>>,
    pub upvalue_descs: Vec<UpvalueDesc>,
    pub source_name: Option<LuaString>,
    pub line_info: Vec<i32>, // line number for each instruction (may be empty when stripped)
    pub loc_vars: Vec<LocVar>,
    pub linedefined: i32,
    pub lastlinedefined: i32,
    pub param_count: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
}

impl Proto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line of the instruction at `pc`, when debug info was kept
    pub fn line_at(&self, pc: usize) -> Option<i32> {
        self.line_info.get(pc).copied()
    }

    /// Number of prototypes in this tree, including itself
    pub fn proto_count(&self) -> usize {
        1 + self
            .child_protos
            .iter()
            .map(|p| p.proto_count())
            .sum::<usize>()
    }

    /// Strings held by this prototype: constants, then debug names
    fn strings(&self) -> impl Iterator<Item = &LuaString> {
        self.constants
            .iter()
            .filter_map(LuaValue::as_string)
            .chain(self.source_name.iter())
            .chain(self.loc_vars.iter().filter_map(|v| v.name.as_ref()))
            .chain(self.upvalue_descs.iter().filter_map(|u| u.name.as_ref()))
    }

    /// Release the blocks `undump` charged for this prototype tree
    pub fn free(&self, gc: &mut dyn GcHost) {
        for child in &self.child_protos {
            child.free(gc);
        }
        for s in self.strings().filter(|s| !s.is_short()) {
            gc.free_block(BlockKind::StringBytes, s.len());
        }
        gc.free_block(BlockKind::LocVars, self.loc_vars.len());
        gc.free_block(BlockKind::LineInfo, self.line_info.len());
        gc.free_block(BlockKind::Upvalues, self.upvalue_descs.len());
        gc.free_block(BlockKind::Protos, self.child_protos.len());
        gc.free_block(BlockKind::Constants, self.constants.len());
        gc.free_block(BlockKind::Code, self.code.len());
        gc.free_block(BlockKind::Proto, 1);
    }
}

/// A fresh, closed upvalue cell
pub type UpvalueCell = Rc<RefCell<LuaValue>>;

/// A prototype bound to its upvalue cells
#[derive(Debug, Clone)]
pub struct LuaClosure {
    pub proto: Rc<Proto>,
    pub upvalues: Vec<UpvalueCell>,
}

impl LuaClosure {
    /// Bind `proto` to as many fresh nil cells as it declares upvalues
    pub fn new(proto: Rc<Proto>) -> Self {
        let upvalues = (0..proto.upvalue_descs.len())
            .map(|_| Rc::new(RefCell::new(LuaValue::Nil)))
            .collect();
        Self { proto, upvalues }
    }
}
