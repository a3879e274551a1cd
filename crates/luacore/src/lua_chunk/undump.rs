use std::io::Read;
use std::rc::Rc;

use super::header::{LUA_SIGNATURE, LUAC_HEADERSIZE, check_header};
use super::verify::verify_proto;
use crate::gc::{BlockKind, GcHost, GcOwner};
use crate::lua_value::{
    LUA_TBOOLEAN, LUA_TNIL, LUA_TNUMBER, LUA_TSTRING, LocVar, LuaClosure, LuaString, LuaValue,
    Proto, UpvalueDesc,
};
use crate::lua_vm::lua_limits::LUAI_MAXCCALLS;
use crate::{Instruction, LuaError, LuaResult, UndumpError};

// Counts come from untrusted input; never reserve more than this up front
const PREALLOC_LIMIT: usize = 1 << 12;

/// Display name of a chunk as it appears in load errors
pub fn chunk_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix('@').or_else(|| name.strip_prefix('=')) {
        rest.to_string()
    } else if name.as_bytes().first() == Some(&LUA_SIGNATURE[0]) {
        "binary string".to_string()
    } else {
        name.to_string()
    }
}

struct LoadState<'a, R> {
    gc: &'a mut dyn GcHost,
    reader: R,
    name: String,
    /// Blocks charged so far, released again if the load fails
    charged: Vec<(BlockKind, usize)>,
}

impl<R: Read> LoadState<'_, R> {
    fn alloc(&mut self, kind: BlockKind, count: usize) -> LuaResult<()> {
        self.gc.alloc_block(kind, count)?;
        self.charged.push((kind, count));
        Ok(())
    }

    fn release(&mut self) {
        for (kind, count) in self.charged.drain(..).rev() {
            self.gc.free_block(kind, count);
        }
    }

    fn error(&self, make: fn(String) -> UndumpError) -> LuaError {
        LuaError::Undump(make(self.name.clone()))
    }

    fn truncated(&self) -> LuaError {
        self.error(|name| UndumpError::Truncated { name })
    }

    fn corrupted(&self) -> LuaError {
        self.error(|name| UndumpError::Corrupted { name })
    }

    fn load_block(&mut self, buf: &mut [u8]) -> LuaResult<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(_) => Err(self.truncated()),
        }
    }

    fn load_array<const N: usize>(&mut self) -> LuaResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.load_block(&mut buf)?;
        Ok(buf)
    }

    fn load_byte(&mut self) -> LuaResult<u8> {
        Ok(self.load_array::<1>()?[0])
    }

    fn load_int(&mut self) -> LuaResult<i32> {
        let x = i32::from_ne_bytes(self.load_array()?);
        if x < 0 {
            return Err(self.corrupted());
        }
        Ok(x)
    }

    #[inline]
    fn load_count(&mut self) -> LuaResult<usize> {
        Ok(self.load_int()? as usize)
    }

    fn load_number(&mut self) -> LuaResult<f64> {
        Ok(f64::from_ne_bytes(self.load_array()?))
    }

    /// Size-prefixed string; size 0 is an absent string, otherwise the last byte is a terminator
    fn load_string(&mut self) -> LuaResult<Option<LuaString>> {
        let size = usize::from_ne_bytes(self.load_array()?);
        if size == 0 {
            return Ok(None);
        }
        let mut bytes = Vec::with_capacity(size.min(PREALLOC_LIMIT));
        let read = (&mut self.reader).take(size as u64).read_to_end(&mut bytes);
        if !matches!(read, Ok(n) if n == size) {
            return Err(self.truncated());
        }
        bytes.pop();
        let s = self.gc.create_string(&bytes)?;
        if !s.is_short() {
            self.charged.push((BlockKind::StringBytes, s.len()));
        }
        Ok(Some(s))
    }

    fn load_code(&mut self, f: &mut Proto) -> LuaResult<()> {
        let n = self.load_count()?;
        self.alloc(BlockKind::Code, n)?;
        f.code.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let word = u32::from_ne_bytes(self.load_array()?);
            f.code.push(Instruction::from_u32(word));
        }
        Ok(())
    }

    fn load_constants(&mut self, f: &mut Proto, depth: usize) -> LuaResult<()> {
        let n = self.load_count()?;
        self.alloc(BlockKind::Constants, n)?;
        f.constants.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let k = match self.load_byte()? {
                LUA_TNIL => LuaValue::Nil,
                LUA_TBOOLEAN => LuaValue::Boolean(self.load_byte()? != 0),
                LUA_TNUMBER => LuaValue::Number(self.load_number()?),
                LUA_TSTRING => {
                    let s = self.load_string()?.ok_or_else(|| self.corrupted())?;
                    let k = LuaValue::String(s);
                    self.gc.barrier_back(GcOwner::Proto(&*f), &k);
                    k
                }
                _ => return Err(self.corrupted()),
            };
            f.constants.push(k);
        }

        let n = self.load_count()?;
        self.alloc(BlockKind::Protos, n)?;
        f.child_protos.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let child = self.load_function(depth + 1)?;
            f.child_protos.push(Rc::new(child));
        }
        Ok(())
    }

    fn load_upvalues(&mut self, f: &mut Proto) -> LuaResult<()> {
        let n = self.load_count()?;
        self.alloc(BlockKind::Upvalues, n)?;
        f.upvalue_descs.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let is_local = self.load_byte()? != 0;
            let index = self.load_byte()?;
            f.upvalue_descs.push(UpvalueDesc {
                is_local,
                index,
                name: None,
            });
        }
        Ok(())
    }

    fn load_name(&mut self, f: &Proto) -> LuaResult<Option<LuaString>> {
        let s = self.load_string()?;
        if let Some(s) = &s {
            self.gc.barrier_back(GcOwner::Proto(f), &LuaValue::String(s.clone()));
        }
        Ok(s)
    }

    fn load_debug(&mut self, f: &mut Proto) -> LuaResult<()> {
        f.source_name = self.load_name(f)?;

        let n = self.load_count()?;
        self.alloc(BlockKind::LineInfo, n)?;
        f.line_info.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let line = i32::from_ne_bytes(self.load_array()?);
            f.line_info.push(line);
        }

        let n = self.load_count()?;
        self.alloc(BlockKind::LocVars, n)?;
        f.loc_vars.reserve(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let name = self.load_name(f)?;
            let start_pc = self.load_int()?;
            let end_pc = self.load_int()?;
            f.loc_vars.push(LocVar {
                name,
                start_pc,
                end_pc,
            });
        }

        let n = self.load_count()?;
        if n > f.upvalue_descs.len() {
            return Err(self.corrupted());
        }
        for i in 0..n {
            let name = self.load_name(f)?;
            f.upvalue_descs[i].name = name;
        }
        Ok(())
    }

    fn load_function(&mut self, depth: usize) -> LuaResult<Proto> {
        if depth > LUAI_MAXCCALLS {
            return Err(self.error(|name| UndumpError::TooDeep { name }));
        }
        self.alloc(BlockKind::Proto, 1)?;
        let mut f = Proto::new();
        f.linedefined = self.load_int()?;
        f.lastlinedefined = self.load_int()?;
        f.param_count = self.load_byte()?;
        f.is_vararg = self.load_byte()? != 0;
        f.max_stack_size = self.load_byte()?;
        self.load_code(&mut f)?;
        self.load_constants(&mut f, depth)?;
        self.load_upvalues(&mut f)?;
        self.load_debug(&mut f)?;
        log::trace!(
            "{}: loaded function at line {} ({} instructions, {} constants)",
            self.name,
            f.linedefined,
            f.code.len(),
            f.constants.len()
        );

        if let Err(fault) = verify_proto(&f) {
            log::debug!("{}: rejected bytecode: {:?}", self.name, fault);
            return Err(fault.into_error(&self.name).into());
        }
        Ok(f)
    }

    fn load_chunk(&mut self) -> LuaResult<Proto> {
        let header: [u8; LUAC_HEADERSIZE] = self.load_array()?;
        check_header(&self.name, &header)?;
        self.load_function(0)
    }
}

/// Load a precompiled chunk from `reader` and bind it to fresh upvalue cells.
///
/// Every prototype is verified as soon as it is complete; the first fault aborts the load
/// and gives back everything charged to `gc` so far. A loaded chunk is released with
/// [`Proto::free`].
pub fn undump<R: Read>(gc: &mut dyn GcHost, reader: R, name: &str) -> LuaResult<LuaClosure> {
    let mut state = LoadState {
        gc,
        reader,
        name: chunk_name(name),
        charged: Vec::new(),
    };
    let proto = match state.load_chunk() {
        Ok(proto) => proto,
        Err(e) => {
            state.release();
            return Err(e);
        }
    };
    log::debug!(
        "{}: loaded chunk with {} prototype(s)",
        state.name,
        proto.proto_count()
    );
    Ok(LuaClosure::new(Rc::new(proto)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_chunk::dump_proto;
    use crate::{Gc, OpCode};

    fn ret() -> Instruction {
        Instruction::create_abc(OpCode::Return, 0, 1, 0)
    }

    #[test]
    fn test_chunk_name() {
        assert_eq!(chunk_name("@script.lua"), "script.lua");
        assert_eq!(chunk_name("=stdin"), "stdin");
        assert_eq!(chunk_name("\x1bLua"), "binary string");
        assert_eq!(chunk_name("plain"), "plain");
    }

    #[test]
    fn test_loads_dumped_function() {
        let mut gc = Gc::default();
        let mut p = Proto::new();
        p.max_stack_size = 2;
        p.code = vec![Instruction::create_abx(OpCode::LoadK, 0, 0), ret()];
        p.constants = vec![LuaValue::Number(2.5)];
        p.upvalue_descs.push(UpvalueDesc::default());
        let bytes = dump_proto(&p, false);

        let closure = undump(&mut gc, bytes.as_slice(), "@t.lua").unwrap();
        assert_eq!(closure.proto.code, p.code);
        assert_eq!(closure.proto.constants, p.constants);
        assert_eq!(closure.upvalues.len(), 1);
    }

    #[test]
    fn test_truncated_and_empty_input() {
        let mut gc = Gc::default();
        let bytes = dump_proto(&Proto::new(), false);
        let err = undump(&mut gc, &bytes[..bytes.len() - 1], "=t").unwrap_err();
        assert_eq!(err, LuaError::Undump(UndumpError::Truncated { name: "t".into() }));
        let err = undump(&mut gc, &[0u8; 0][..], "=t").unwrap_err();
        assert_eq!(err, LuaError::Undump(UndumpError::Truncated { name: "t".into() }));
    }

    #[test]
    fn test_negative_count_is_corrupted() {
        let mut gc = Gc::default();
        let mut bytes = dump_proto(&Proto::new(), false);
        // code count follows 2 ints and 3 bytes
        let at = LUAC_HEADERSIZE + 11;
        bytes[at..at + 4].copy_from_slice(&(-1i32).to_ne_bytes());
        let err = undump(&mut gc, bytes.as_slice(), "=t").unwrap_err();
        assert_eq!(err, LuaError::Undump(UndumpError::Corrupted { name: "t".into() }));
    }
}
