// Precompiled chunk support (Lua 5.2 binary format)
//
// A chunk is an 18-byte header followed by one function record. Loading is a
// security boundary: every prototype is checked by the verifier as soon as it is
// complete, so nothing unverified ever reaches an interpreter.
mod dump;
mod header;
mod undump;
mod verify;

pub use dump::dump_proto;
pub use header::{LUA_SIGNATURE, LUAC_FORMAT, LUAC_HEADERSIZE, LUAC_TAIL, LUAC_VERSION, luac_header};
pub use undump::{chunk_name, undump};
pub use verify::{BytecodeFault, verify_proto};
