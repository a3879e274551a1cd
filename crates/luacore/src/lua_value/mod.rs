// Lua 5.2 value representation
// Numbers are f64, strings are shared byte strings, heap objects are referenced by id
pub mod lua_proto;
pub mod lua_string;
pub mod lua_table;
mod lua_value;

pub use lua_proto::{LocVar, LuaClosure, Proto, UpvalueDesc};
pub use lua_string::LuaString;
pub use lua_table::LuaTable;
pub use lua_value::*;
