// Loader scenarios: dumped chunks, header grading, malformed records, nesting limits
use std::rc::Rc;

use crate::gc::GcEvent;
use crate::lua_chunk::LUAC_HEADERSIZE;
use crate::lua_value::{LocVar, UpvalueDesc};
use crate::lua_vm::lua_limits::LUAI_MAXCCALLS;
use crate::{
    Gc, GcHost, Instruction, LuaError, LuaValue, OpCode, Proto, RecordingGc, SafeOption,
    UndumpError, dump_proto, undump,
};

fn ret() -> Instruction {
    Instruction::create_abc(OpCode::Return, 0, 1, 0)
}

fn undump_err(bytes: &[u8]) -> UndumpError {
    let mut gc = Gc::default();
    match undump(&mut gc, bytes, "=chunk") {
        Err(LuaError::Undump(e)) => e,
        other => panic!("expected an undump error, got {:?}", other.map(|_| ())),
    }
}

/// `function(a) local x = "hi"; return function() return x end end`, hand assembled
fn sample_proto(gc: &mut dyn GcHost) -> Proto {
    let inner = Proto {
        code: vec![
            Instruction::create_abc(OpCode::GetUpval, 0, 0, 0),
            Instruction::create_abc(OpCode::Return, 0, 2, 0),
            ret(),
        ],
        upvalue_descs: vec![UpvalueDesc {
            is_local: true,
            index: 1,
            name: Some(gc.create_string(b"x").unwrap()),
        }],
        line_info: vec![1, 1, 1],
        linedefined: 1,
        lastlinedefined: 1,
        max_stack_size: 2,
        ..Proto::default()
    };
    Proto {
        code: vec![
            Instruction::create_abx(OpCode::LoadK, 1, 0),
            Instruction::create_abx(OpCode::Closure, 2, 0),
            Instruction::create_abc(OpCode::Return, 2, 2, 0),
            ret(),
        ],
        constants: vec![LuaValue::String(gc.create_string(b"hi").unwrap())],
        child_protos: vec![Rc::new(inner)],
        source_name: Some(gc.create_string(b"@sample.lua").unwrap()),
        line_info: vec![1, 1, 1, 1],
        loc_vars: vec![
            LocVar {
                name: Some(gc.create_string(b"a").unwrap()),
                start_pc: 0,
                end_pc: 4,
            },
            LocVar {
                name: Some(gc.create_string(b"x").unwrap()),
                start_pc: 1,
                end_pc: 4,
            },
        ],
        param_count: 1,
        max_stack_size: 3,
        ..Proto::default()
    }
}

#[test]
fn test_load_nested_chunk() {
    let mut gc = RecordingGc::default();
    let bytes = dump_proto(&sample_proto(&mut gc), false);
    gc.clear();

    let closure = undump(&mut gc, bytes.as_slice(), "@sample.lua").unwrap();
    let p = &closure.proto;
    assert_eq!(p.param_count, 1);
    assert_eq!(p.code.len(), 4);
    assert_eq!(p.constants[0].as_string().map(|s| s.as_bytes()), Some(&b"hi"[..]));
    assert_eq!(p.proto_count(), 2);
    assert_eq!(p.loc_vars.len(), 2);
    assert_eq!(p.loc_vars[1].start_pc, 1);
    assert_eq!(p.source_name.as_ref().map(|s| s.to_string()), Some("@sample.lua".to_string()));

    let inner = &p.child_protos[0];
    assert_eq!(inner.upvalue_descs[0].index, 1);
    assert!(inner.upvalue_descs[0].is_local);
    assert_eq!(inner.upvalue_descs[0].name.as_ref().map(|s| s.to_string()), Some("x".to_string()));
    assert_eq!(inner.line_at(2), Some(1));

    // the main function declares no upvalues
    assert!(closure.upvalues.is_empty());

    // every string stored into a prototype is reported
    let proto_barriers = gc
        .events()
        .iter()
        .filter(|e| matches!(e, GcEvent::Barrier { owner: "proto", .. }))
        .count();
    assert_eq!(proto_barriers, 5);
    assert_eq!(gc.growths(crate::BlockKind::Proto), 2);
}

#[test]
fn test_loaded_strings_are_interned() {
    let mut gc = Gc::default();
    let bytes = dump_proto(&sample_proto(&mut gc), false);
    let closure = undump(&mut gc, bytes.as_slice(), "=x").unwrap();
    let hi = gc.create_string(b"hi").unwrap();
    assert!(closure.proto.constants[0].as_string().unwrap().ptr_eq(&hi));
}

#[test]
fn test_stripped_chunk_has_no_debug_info() {
    let mut gc = Gc::default();
    let bytes = dump_proto(&sample_proto(&mut gc), true);
    let closure = undump(&mut gc, bytes.as_slice(), "=x").unwrap();
    assert!(closure.proto.source_name.is_none());
    assert!(closure.proto.line_info.is_empty());
    assert!(closure.proto.loc_vars.is_empty());
    assert!(closure.proto.child_protos[0].upvalue_descs[0].name.is_none());
    assert_eq!(closure.proto.line_at(0), None);
}

#[test]
fn test_upvalue_cells_follow_descriptors() {
    let mut gc = Gc::default();
    let p = Proto {
        code: vec![ret()],
        upvalue_descs: vec![UpvalueDesc::default(), UpvalueDesc::default()],
        ..Proto::default()
    };
    let closure = undump(&mut gc, dump_proto(&p, false).as_slice(), "=x").unwrap();
    assert_eq!(closure.upvalues.len(), 2);
    assert!(closure.upvalues.iter().all(|c| c.borrow().is_nil()));
    assert!(!Rc::ptr_eq(&closure.upvalues[0], &closure.upvalues[1]));
}

#[test]
fn test_loadk_constant_bound() {
    let load = |bx| Proto {
        code: vec![Instruction::create_abx(OpCode::LoadK, 0, bx), ret()],
        constants: vec![LuaValue::Number(1.0)],
        max_stack_size: 1,
        ..Proto::default()
    };
    let mut gc = Gc::default();
    assert!(undump(&mut gc, dump_proto(&load(0), false).as_slice(), "=ok").is_ok());

    let err = undump_err(&dump_proto(&load(1), false));
    assert_eq!(
        err,
        UndumpError::InvalidBytecode {
            name: "chunk".into(),
            pc: 0,
            opcode: Some(OpCode::LoadK),
            reason: "constant index out of range",
        }
    );
}

#[test]
fn test_fault_in_nested_prototype() {
    let bad_child = Proto {
        code: vec![Instruction::create_abc(OpCode::Move, 0, 5, 0), ret()],
        max_stack_size: 2,
        ..Proto::default()
    };
    let parent = Proto {
        code: vec![Instruction::create_abx(OpCode::Closure, 0, 0), ret()],
        child_protos: vec![Rc::new(bad_child)],
        max_stack_size: 1,
        ..Proto::default()
    };
    match undump_err(&dump_proto(&parent, false)) {
        UndumpError::InvalidBytecode { pc, opcode, .. } => {
            assert_eq!(pc, 0);
            assert_eq!(opcode, Some(OpCode::Move));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_header_grading() {
    let good = dump_proto(&Proto::default(), false);
    let graded = |pos: usize| {
        let mut bytes = good.clone();
        bytes[pos] ^= 0x40;
        undump_err(&bytes)
    };
    assert_eq!(graded(1), UndumpError::NotAChunk { name: "chunk".into() });
    assert_eq!(graded(4), UndumpError::VersionMismatch { name: "chunk".into() });
    assert_eq!(graded(8), UndumpError::Incompatible { name: "chunk".into() });
    assert_eq!(graded(15), UndumpError::Corrupted { name: "chunk".into() });
}

#[test]
fn test_bad_signature_rejected_before_function_record() {
    let mut header = crate::lua_chunk::luac_header();
    header[0] = b'#';
    // nothing follows the header: a loader reading on would report truncation
    assert_eq!(undump_err(&header), UndumpError::NotAChunk { name: "chunk".into() });
}

#[test]
fn test_truncation_at_every_length() {
    let mut gc = Gc::default();
    let bytes = dump_proto(&sample_proto(&mut gc), false);
    for len in 0..bytes.len() {
        let err = undump_err(&bytes[..len]);
        assert_eq!(err, UndumpError::Truncated { name: "chunk".into() }, "length {}", len);
    }
}

#[test]
fn test_malformed_records_are_corrupted() {
    let corrupted = UndumpError::Corrupted { name: "chunk".into() };
    // a single nil constant; its tag follows 2 ints, 3 bytes and 2 counts
    let p = Proto {
        constants: vec![LuaValue::Nil],
        ..Proto::default()
    };
    let tag_at = LUAC_HEADERSIZE + 8 + 3 + 4 + 4;

    let mut bytes = dump_proto(&p, false);
    assert_eq!(bytes[tag_at], 0);
    bytes[tag_at] = 9;
    assert_eq!(undump_err(&bytes), corrupted);

    // a string constant encoded as absent
    let mut bytes = dump_proto(&p, false);
    bytes[tag_at] = 4;
    assert_eq!(undump_err(&bytes), corrupted);

    // more upvalue names than upvalues: the name count is the last field
    let mut bytes = dump_proto(&Proto::default(), false);
    let at = bytes.len() - 4;
    bytes[at..].copy_from_slice(&1i32.to_ne_bytes());
    assert_eq!(undump_err(&bytes), corrupted);

    // negative local variable start pc
    let p = Proto {
        loc_vars: vec![LocVar {
            name: None,
            start_pc: 0,
            end_pc: 0,
        }],
        ..Proto::default()
    };
    let mut bytes = dump_proto(&p, false);
    // loc var record: name(size_t) start end, followed by the upvalue name count
    let start_at = bytes.len() - 12;
    bytes[start_at..start_at + 4].copy_from_slice(&(-3i32).to_ne_bytes());
    assert_eq!(undump_err(&bytes), corrupted);
}

fn nested(levels: usize) -> Proto {
    let mut p = Proto {
        code: vec![ret()],
        ..Proto::default()
    };
    for _ in 0..levels {
        p = Proto {
            code: vec![ret()],
            child_protos: vec![Rc::new(p)],
            ..Proto::default()
        };
    }
    p
}

#[test]
fn test_nesting_limit() {
    let mut gc = Gc::default();
    let ok = dump_proto(&nested(LUAI_MAXCCALLS), false);
    assert!(undump(&mut gc, ok.as_slice(), "=deep").is_ok());

    let too_deep = dump_proto(&nested(LUAI_MAXCCALLS + 1), false);
    assert_eq!(undump_err(&too_deep), UndumpError::TooDeep { name: "chunk".into() });
}

#[test]
fn test_memory_refusal_propagates() {
    let mut gc = Gc::new(SafeOption {
        max_memory_limit: 64,
        ..SafeOption::default()
    });
    let mut scratch = Gc::default();
    let bytes = dump_proto(&sample_proto(&mut scratch), false);
    assert_eq!(
        undump(&mut gc, bytes.as_slice(), "=x").unwrap_err(),
        LuaError::OutOfMemory
    );
}

#[test]
fn test_failed_load_gives_back_its_charges() {
    let mut gc = Gc::new(SafeOption {
        max_memory_limit: 1 << 20,
        ..SafeOption::default()
    });
    // a function record announcing 100_000 instructions but carrying only a few
    let p = Proto {
        code: vec![ret(); 100_000],
        ..Proto::default()
    };
    let bytes = dump_proto(&p, true);
    let cut = &bytes[..LUAC_HEADERSIZE + 8 + 3 + 4 + 16];
    for _ in 0..5 {
        let err = undump(&mut gc, cut, "=chunk").unwrap_err();
        assert_eq!(err, LuaError::Undump(UndumpError::Truncated { name: "chunk".into() }));
        assert_eq!(gc.total_bytes(), 0);
    }
}

#[test]
fn test_rejected_bytecode_releases_long_strings() {
    let mut scratch = Gc::default();
    let long = scratch.create_string(&[b'k'; 64]).unwrap();
    let p = Proto {
        code: vec![Instruction::create_abx(OpCode::LoadK, 0, 1), ret()],
        constants: vec![LuaValue::String(long)],
        max_stack_size: 1,
        ..Proto::default()
    };
    let mut gc = Gc::default();
    let err = undump(&mut gc, dump_proto(&p, false).as_slice(), "=x").unwrap_err();
    assert!(matches!(err, LuaError::Undump(UndumpError::InvalidBytecode { .. })));
    assert_eq!(gc.total_bytes(), 0);
}

#[test]
fn test_truncated_loads_leave_no_accounting_behind() {
    let mut scratch = Gc::default();
    let bytes = dump_proto(&sample_proto(&mut scratch), false);
    let mut gc = Gc::default();
    for len in 0..bytes.len() {
        assert!(undump(&mut gc, &bytes[..len], "=x").is_err());
        // interned names of the dropped prototypes go with the next sweep
        gc.sweep_strings();
        assert_eq!(gc.total_bytes(), 0, "length {}", len);
    }
}

#[test]
fn test_free_releases_loaded_chunk() {
    let mut scratch = Gc::default();
    let mut p = sample_proto(&mut scratch);
    p.constants
        .push(LuaValue::String(scratch.create_string(&[b'z'; 100]).unwrap()));
    let bytes = dump_proto(&p, false);

    let mut gc = Gc::default();
    let closure = undump(&mut gc, bytes.as_slice(), "=x").unwrap();
    assert!(gc.total_bytes() > 0);
    closure.proto.free(&mut gc);
    drop(closure);
    gc.sweep_strings();
    assert_eq!(gc.total_bytes(), 0);
}

#[test]
fn test_error_names_use_display_name() {
    let mut gc = Gc::default();
    let err = undump(&mut gc, &b"\x1bLu"[..], "@scripts/main.lua").unwrap_err();
    assert_eq!(err.to_string(), "scripts/main.lua: truncated precompiled chunk");

    let err = undump(&mut gc, &b"-- plain source text"[..], "\x1bLua").unwrap_err();
    assert_eq!(err.to_string(), "binary string: not a precompiled chunk");
}
