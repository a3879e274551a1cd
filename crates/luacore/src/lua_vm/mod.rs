pub mod lua_error;
pub mod lua_limits;
pub mod opcode;
mod safe_option;

pub use lua_error::{LuaError, UndumpError};
pub use opcode::{Instruction, OpCode, OpMode};
pub use safe_option::SafeOption;

pub type LuaResult<T> = Result<T, LuaError>;
