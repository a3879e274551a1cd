// Lua 5.2 core
// Insertion-ordered tables and a verifying loader for precompiled chunks

#[cfg(test)]
mod test;

pub mod gc;
pub mod lua_chunk;
pub mod lua_value;
pub mod lua_vm;

pub use gc::{BlockKind, Gc, GcHost, GcId, GcKind, GcOwner, RecordingGc};
pub use lua_chunk::{dump_proto, undump, verify_proto};
pub use lua_value::{LuaClosure, LuaString, LuaTable, LuaValue, Proto};
pub use lua_vm::{Instruction, LuaError, LuaResult, OpCode, OpMode, SafeOption, UndumpError};
