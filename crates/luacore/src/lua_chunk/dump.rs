// Writer for the format `undump` reads: native byte order, header-declared widths

use super::header::luac_header;
use crate::lua_value::{
    LUA_TBOOLEAN, LUA_TNIL, LUA_TNUMBER, LUA_TSTRING, LuaString, LuaValue, Proto,
};

/// Serialize `proto` as a complete chunk. With `strip`, debug info is written empty.
pub fn dump_proto(proto: &Proto, strip: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + proto.code.len() * 4);
    buf.extend_from_slice(&luac_header());
    write_function(&mut buf, proto, strip);
    buf
}

fn write_function(buf: &mut Vec<u8>, f: &Proto, strip: bool) {
    write_int(buf, f.linedefined);
    write_int(buf, f.lastlinedefined);
    buf.push(f.param_count);
    buf.push(u8::from(f.is_vararg));
    buf.push(f.max_stack_size);

    let n = write_count(buf, f.code.len());
    for inst in f.code.iter().take(n) {
        buf.extend_from_slice(&inst.as_u32().to_ne_bytes());
    }

    let n = write_count(buf, f.constants.len());
    for k in f.constants.iter().take(n) {
        write_constant(buf, k);
    }
    let n = write_count(buf, f.child_protos.len());
    for child in f.child_protos.iter().take(n) {
        write_function(buf, child, strip);
    }

    let n = write_count(buf, f.upvalue_descs.len());
    for uv in f.upvalue_descs.iter().take(n) {
        buf.push(u8::from(uv.is_local));
        buf.push(uv.index);
    }

    // debug
    if strip {
        write_string(buf, None);
        write_count(buf, 0);
        write_count(buf, 0);
        write_count(buf, 0);
        return;
    }
    write_string(buf, f.source_name.as_ref());
    // line numbers are the one integer field read without a sign check
    let n = write_count(buf, f.line_info.len());
    for &line in f.line_info.iter().take(n) {
        buf.extend_from_slice(&line.to_ne_bytes());
    }
    let n = write_count(buf, f.loc_vars.len());
    for var in f.loc_vars.iter().take(n) {
        write_string(buf, var.name.as_ref());
        write_int(buf, var.start_pc);
        write_int(buf, var.end_pc);
    }
    let n = write_count(buf, f.upvalue_descs.len());
    for uv in f.upvalue_descs.iter().take(n) {
        write_string(buf, uv.name.as_ref());
    }
}

fn write_constant(buf: &mut Vec<u8>, k: &LuaValue) {
    match k {
        LuaValue::Boolean(b) => {
            buf.push(LUA_TBOOLEAN);
            buf.push(u8::from(*b));
        }
        LuaValue::Number(n) => {
            buf.push(LUA_TNUMBER);
            buf.extend_from_slice(&n.to_ne_bytes());
        }
        LuaValue::String(s) => {
            buf.push(LUA_TSTRING);
            write_string(buf, Some(s));
        }
        LuaValue::Nil => buf.push(LUA_TNIL),
        other => {
            // only compiler-produced constants have an encoding
            log::warn!("constant of type {} dumped as nil", other.type_name());
            buf.push(LUA_TNIL);
        }
    }
}

/// Integer field the loader requires to be non-negative; negatives are written as 0
fn write_int(buf: &mut Vec<u8>, v: i32) {
    if v < 0 {
        log::warn!("negative field {} dumped as 0", v);
    }
    buf.extend_from_slice(&v.max(0).to_ne_bytes());
}

/// Element count, capped at the largest int; returns how many elements follow
fn write_count(buf: &mut Vec<u8>, n: usize) -> usize {
    let capped = n.min(i32::MAX as usize);
    if capped < n {
        log::warn!("{} elements dumped as {}", n, capped);
    }
    buf.extend_from_slice(&(capped as i32).to_ne_bytes());
    capped
}

/// Size prefix counts the trailing NUL; size 0 encodes an absent string
fn write_string(buf: &mut Vec<u8>, s: Option<&LuaString>) {
    match s {
        None => buf.extend_from_slice(&0usize.to_ne_bytes()),
        Some(s) => {
            buf.extend_from_slice(&(s.len() + 1).to_ne_bytes());
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
    }
}
