// Verifier scenarios on hand-assembled functions shaped like compiler output
use std::rc::Rc;

use crate::lua_chunk::{BytecodeFault, verify_proto};
use crate::lua_value::UpvalueDesc;
use crate::{Gc, Instruction, LuaError, LuaValue, OpCode, Proto, UndumpError, dump_proto, undump};

use OpCode::*;

fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Instruction {
    Instruction::create_abc(op, a, b, c)
}

fn abx(op: OpCode, a: u32, bx: u32) -> Instruction {
    Instruction::create_abx(op, a, bx)
}

fn asbx(op: OpCode, a: u32, sbx: i32) -> Instruction {
    Instruction::create_asbx(op, a, sbx)
}

fn k(n: u32) -> u32 {
    Instruction::BITRK | n
}

fn function(code: Vec<Instruction>, constants: Vec<LuaValue>, max_stack: u8) -> Proto {
    Proto {
        code,
        constants,
        max_stack_size: max_stack,
        upvalue_descs: vec![UpvalueDesc {
            is_local: true,
            index: 0,
            name: None,
        }],
        ..Proto::default()
    }
}

/// `local s = 0; for i = 1, 10 do s = s + i end; return s`
fn numeric_for() -> Proto {
    function(
        vec![
            abx(LoadK, 0, 0),
            abx(LoadK, 1, 1),
            abx(LoadK, 2, 2),
            abx(LoadK, 3, 1),
            asbx(ForPrep, 1, 1),
            abc(Add, 0, 0, 4),
            asbx(ForLoop, 1, -2),
            abc(Return, 0, 2, 0),
            abc(Return, 0, 1, 0),
        ],
        vec![LuaValue::Number(0.0), LuaValue::Number(1.0), LuaValue::Number(10.0)],
        5,
    )
}

/// `for k, v in pairs(t) do print(k, v) end`
fn generic_for() -> Proto {
    function(
        vec![
            abc(GetTabUp, 0, 0, k(0)),
            abc(GetTabUp, 1, 0, k(1)),
            abc(Call, 0, 2, 4),
            asbx(Jmp, 0, 4),
            abc(GetTabUp, 5, 0, k(2)),
            abc(Move, 6, 3, 0),
            abc(Move, 7, 4, 0),
            abc(Call, 5, 3, 1),
            abc(TForCall, 0, 0, 2),
            asbx(TForLoop, 2, -6),
            abc(Return, 0, 1, 0),
        ],
        vec![LuaValue::Nil, LuaValue::Nil, LuaValue::Nil],
        8,
    )
}

/// `local t = {1, 2, 3}; if t[1] == 1 then return t end`
fn constructor_and_branch() -> Proto {
    function(
        vec![
            abc(NewTable, 0, 3, 0),
            abx(LoadK, 1, 0),
            abx(LoadK, 2, 1),
            abx(LoadK, 3, 2),
            abc(SetList, 0, 3, 1),
            abc(GetTable, 1, 0, k(0)),
            abc(Eq, 0, 1, k(0)),
            asbx(Jmp, 0, 1),
            abc(Return, 0, 2, 0),
            abc(Return, 0, 1, 0),
        ],
        vec![LuaValue::Number(1.0), LuaValue::Number(2.0), LuaValue::Number(3.0)],
        4,
    )
}

/// `return function(...) local a, b = ...; return f(a, b) end`
fn vararg_tailcall() -> Proto {
    let inner = Proto {
        is_vararg: true,
        ..function(
            vec![
                abc(Vararg, 0, 3, 0),
                abc(GetTabUp, 2, 0, k(0)),
                abc(Move, 3, 0, 0),
                abc(Move, 4, 1, 0),
                abc(TailCall, 2, 3, 0),
                abc(Return, 2, 0, 0),
                abc(Return, 0, 1, 0),
            ],
            vec![LuaValue::Nil],
            5,
        )
    };
    Proto {
        child_protos: vec![Rc::new(inner)],
        ..function(
            vec![abx(Closure, 0, 0), abc(Return, 0, 2, 0), abc(Return, 0, 1, 0)],
            vec![],
            2,
        )
    }
}

#[test]
fn test_compiler_shaped_functions_verify() {
    for (name, p) in [
        ("numeric for", numeric_for()),
        ("generic for", generic_for()),
        ("constructor", constructor_and_branch()),
        ("vararg", vararg_tailcall()),
    ] {
        assert_eq!(verify_proto(&p), Ok(()), "{}", name);
        let mut gc = Gc::default();
        assert!(undump(&mut gc, dump_proto(&p, true).as_slice(), name).is_ok(), "{}", name);
    }
}

fn fault(p: &Proto) -> BytecodeFault {
    verify_proto(p).unwrap_err()
}

#[test]
fn test_loop_jump_out_of_function() {
    let mut p = numeric_for();
    p.code[6] = asbx(ForLoop, 1, 3);
    let f = fault(&p);
    assert_eq!((f.pc, f.opcode), (6, Some(ForLoop)));
    assert_eq!(f.reason, "jump target out of range");
}

#[test]
fn test_for_registers_must_fit_stack() {
    // the top register is max_stack_size itself
    let mut p = numeric_for();
    p.max_stack_size = 3;
    let f = fault(&p);
    assert_eq!((f.pc, f.opcode), (5, Some(Add)));
    assert_eq!(f.reason, "register out of range");

    let mut p = numeric_for();
    p.max_stack_size = 2;
    let f = fault(&p);
    assert_eq!((f.pc, f.opcode), (3, Some(LoadK)));

    let mut p = numeric_for();
    p.max_stack_size = 4;
    p.code[6] = asbx(ForLoop, 2, -2);
    assert_eq!(fault(&p).opcode, Some(ForLoop));
}

#[test]
fn test_generic_for_pairing() {
    let mut p = generic_for();
    p.code[9] = asbx(Jmp, 2, -6);
    let f = fault(&p);
    assert_eq!((f.pc, f.reason), (9, "TFORCALL not followed by TFORLOOP"));

    // TFORCALL results must fit: A + C + 2
    let mut p = generic_for();
    p.code[8] = abc(TForCall, 0, 0, 7);
    assert_eq!(fault(&p).pc, 8);

    // TFORLOOP jumping before the function start
    let mut p = generic_for();
    p.code[9] = asbx(TForLoop, 2, -20);
    assert_eq!(fault(&p).reason, "jump target out of range");
}

#[test]
fn test_branch_requires_jump() {
    let mut p = constructor_and_branch();
    p.code[7] = abc(Move, 0, 0, 0);
    let f = fault(&p);
    assert_eq!((f.pc, f.opcode), (7, Some(Move)));
    assert_eq!(f.reason, "test not followed by JMP");

    let mut p = constructor_and_branch();
    p.code[6] = abc(Eq, 2, 1, k(0));
    assert_eq!(fault(&p).reason, "operand must be 0 or 1");

    let mut p = constructor_and_branch();
    p.code[6] = abc(Eq, 0, 1, k(3));
    assert_eq!(fault(&p).reason, "constant index out of range");
}

#[test]
fn test_setlist_span() {
    let mut p = constructor_and_branch();
    p.code[4] = abc(SetList, 0, 5, 1);
    assert_eq!((fault(&p).pc, fault(&p).opcode), (4, Some(SetList)));
}

#[test]
fn test_vararg_and_tailcall_spans() {
    let inner = |code: Vec<Instruction>| Proto {
        is_vararg: true,
        ..function(code, vec![LuaValue::Nil], 5)
    };
    assert!(verify_proto(&inner(vec![abc(Vararg, 0, 1, 0)])).is_err());
    assert!(verify_proto(&inner(vec![abc(Vararg, 4, 2, 0)])).is_ok());
    assert!(verify_proto(&inner(vec![abc(Vararg, 4, 3, 0)])).is_ok());
    assert!(verify_proto(&inner(vec![abc(Vararg, 4, 4, 0)])).is_err());
    assert!(verify_proto(&inner(vec![abc(TailCall, 2, 4, 0)])).is_ok());
    assert!(verify_proto(&inner(vec![abc(TailCall, 2, 5, 0)])).is_err());
    assert!(verify_proto(&inner(vec![abc(Return, 2, 5, 0)])).is_ok());
    assert!(verify_proto(&inner(vec![abc(Return, 2, 6, 0)])).is_err());
    assert!(verify_proto(&inner(vec![abc(Return, 200, 1, 0)])).is_ok());
}

#[test]
fn test_upvalue_table_access() {
    let mut p = generic_for();
    p.code[0] = abc(GetTabUp, 0, 1, k(0));
    assert_eq!(fault(&p).reason, "upvalue index out of range");

    let p = function(vec![abc(SetTabUp, 0, k(0), 3)], vec![LuaValue::Nil], 3);
    assert!(verify_proto(&p).is_ok());
    let p = function(vec![abc(SetTabUp, 1, k(0), 3)], vec![LuaValue::Nil], 3);
    assert!(verify_proto(&p).is_err());
}

#[test]
fn test_loader_reports_fault_with_chunk_name() {
    let mut p = numeric_for();
    p.code[5] = abc(Add, 0, 0, k(7));
    let mut gc = Gc::default();
    let err = undump(&mut gc, dump_proto(&p, false).as_slice(), "@loop.lua").unwrap_err();
    assert_eq!(
        err,
        LuaError::Undump(UndumpError::InvalidBytecode {
            name: "loop.lua".into(),
            pc: 5,
            opcode: Some(Add),
            reason: "constant index out of range",
        })
    );
    assert_eq!(
        err.to_string(),
        "loop.lua: invalid bytecode in precompiled chunk (constant index out of range at pc 5)"
    );
}
