//! Static operand checks over a loaded prototype.
//!
//! A single forward pass: every register operand must be `<= max_stack_size`, every
//! constant, upvalue and nested prototype index must be in range, and every jump must
//! land inside `[0, code.len()]`. Instructions with a mandatory successor (LOADKX,
//! comparisons, tests, TFORCALL, SETLIST with C == 0) are checked together with that
//! successor and the scan steps over both.

use crate::lua_value::Proto;
use crate::lua_vm::UndumpError;
use crate::{Instruction, OpCode};

/// First operand violation found in a prototype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeFault {
    pub pc: usize,
    pub opcode: Option<OpCode>,
    pub reason: &'static str,
}

impl BytecodeFault {
    pub fn into_error(self, name: &str) -> UndumpError {
        UndumpError::InvalidBytecode {
            name: name.to_string(),
            pc: self.pc,
            opcode: self.opcode,
            reason: self.reason,
        }
    }
}

/// What an instruction requires of the instruction after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Successor {
    Standalone,
    /// EXTRAARG carrying any argument
    ExtraArg,
    /// EXTRAARG carrying a constant index
    ExtraArgConstant,
    /// A conditional jump
    Jump,
    TForLoop,
}

struct Verifier<'a> {
    proto: &'a Proto,
    max_stack: u32,
}

type Check = Result<(), BytecodeFault>;

impl Verifier<'_> {
    #[inline]
    fn fault(pc: usize, op: OpCode, reason: &'static str) -> BytecodeFault {
        BytecodeFault {
            pc,
            opcode: Some(op),
            reason,
        }
    }

    #[inline]
    fn ensure(pc: usize, op: OpCode, cond: bool, reason: &'static str) -> Check {
        if cond {
            Ok(())
        } else {
            Err(Self::fault(pc, op, reason))
        }
    }

    fn reg(&self, pc: usize, op: OpCode, r: u32) -> Check {
        Self::ensure(pc, op, r <= self.max_stack, "register out of range")
    }

    fn konst(&self, pc: usize, op: OpCode, k: u32) -> Check {
        Self::ensure(
            pc,
            op,
            (k as usize) < self.proto.constants.len(),
            "constant index out of range",
        )
    }

    fn rk(&self, pc: usize, op: OpCode, x: u32) -> Check {
        if Instruction::is_k(x) {
            self.konst(pc, op, Instruction::rk_index(x))
        } else {
            self.reg(pc, op, x)
        }
    }

    fn upval(&self, pc: usize, op: OpCode, u: u32) -> Check {
        Self::ensure(
            pc,
            op,
            (u as usize) < self.proto.upvalue_descs.len(),
            "upvalue index out of range",
        )
    }

    fn flag(pc: usize, op: OpCode, x: u32) -> Check {
        Self::ensure(pc, op, x <= 1, "operand must be 0 or 1")
    }

    /// Jump at `pc`: A names a register, `pc + 1 + sBx` stays within the function
    fn jump(&self, pc: usize, op: OpCode, inst: Instruction) -> Check {
        self.reg(pc, op, inst.get_a())?;
        let target = pc as i64 + 1 + inst.get_sbx() as i64;
        Self::ensure(
            pc,
            op,
            target >= 0 && target <= self.proto.code.len() as i64,
            "jump target out of range",
        )
    }

    /// Check the operands of a leading instruction and report what must follow it
    fn check_instruction(&self, pc: usize, op: OpCode, inst: Instruction) -> Result<Successor, BytecodeFault> {
        use OpCode::*;
        let (a, b, c) = (inst.get_a(), inst.get_b(), inst.get_c());
        match op {
            Move | Unm | Not | Len => {
                self.reg(pc, op, a)?;
                self.reg(pc, op, b)?;
            }
            LoadK => {
                self.reg(pc, op, a)?;
                self.konst(pc, op, inst.get_bx())?;
            }
            LoadKX => {
                self.reg(pc, op, a)?;
                return Ok(Successor::ExtraArgConstant);
            }
            LoadBool => {
                // any instruction may follow, the skipped one is checked on its own
                self.reg(pc, op, a)?;
                Self::flag(pc, op, b)?;
                Self::flag(pc, op, c)?;
            }
            LoadNil => {
                self.reg(pc, op, a)?;
                self.reg(pc, op, a + b)?;
            }
            GetUpval | SetUpval => {
                self.reg(pc, op, a)?;
                self.upval(pc, op, b)?;
            }
            GetTabUp => {
                self.reg(pc, op, a)?;
                self.upval(pc, op, b)?;
                self.rk(pc, op, c)?;
            }
            GetTable | Self_ => {
                if op == Self_ {
                    self.reg(pc, op, a + 1)?;
                }
                self.reg(pc, op, a)?;
                self.reg(pc, op, b)?;
                self.rk(pc, op, c)?;
            }
            SetTabUp => {
                self.upval(pc, op, a)?;
                self.rk(pc, op, b)?;
                self.rk(pc, op, c)?;
            }
            NewTable => self.reg(pc, op, a)?,
            SetTable | Add | Sub | Mul | Div | Mod | Pow => {
                self.reg(pc, op, a)?;
                self.rk(pc, op, b)?;
                self.rk(pc, op, c)?;
            }
            Concat => {
                self.reg(pc, op, a)?;
                self.reg(pc, op, b)?;
                self.reg(pc, op, c)?;
                Self::ensure(pc, op, b < c, "empty concatenation range")?;
            }
            Jmp => self.jump(pc, op, inst)?,
            Eq | Lt | Le => {
                Self::flag(pc, op, a)?;
                self.rk(pc, op, b)?;
                self.rk(pc, op, c)?;
                return Ok(Successor::Jump);
            }
            Test => {
                self.reg(pc, op, a)?;
                Self::flag(pc, op, c)?;
                return Ok(Successor::Jump);
            }
            TestSet => {
                self.reg(pc, op, a)?;
                self.reg(pc, op, b)?;
                Self::flag(pc, op, c)?;
                return Ok(Successor::Jump);
            }
            Call | TailCall => {
                if op == Call {
                    // C == 0: open results, C == 1: no results
                    let last_result = if c <= 1 { a } else { a + c - 2 };
                    self.reg(pc, op, last_result)?;
                }
                // B == 0: arguments up to top, B == 1: no arguments
                let last_arg = if b <= 1 { a } else { a + b - 1 };
                self.reg(pc, op, last_arg)?;
            }
            Return => match b {
                0 => self.reg(pc, op, a)?,
                1 => {}
                _ => self.reg(pc, op, a + b - 2)?,
            },
            ForLoop => {
                self.reg(pc, op, a + 3)?;
                self.jump(pc, op, inst)?;
            }
            ForPrep => {
                self.reg(pc, op, a + 2)?;
                self.jump(pc, op, inst)?;
            }
            TForCall => {
                self.reg(pc, op, a)?;
                self.reg(pc, op, a + 2)?;
                self.reg(pc, op, a + c + 2)?;
                return Ok(Successor::TForLoop);
            }
            SetList => {
                let last = if b == 0 { a } else { a + b };
                self.reg(pc, op, last)?;
                if c == 0 {
                    return Ok(Successor::ExtraArg);
                }
            }
            Closure => {
                self.reg(pc, op, a)?;
                Self::ensure(
                    pc,
                    op,
                    (inst.get_bx() as usize) < self.proto.child_protos.len(),
                    "prototype index out of range",
                )?;
            }
            Vararg => {
                self.reg(pc, op, a)?;
                if b != 0 {
                    Self::ensure(pc, op, b != 1, "vararg with no results")?;
                    self.reg(pc, op, a + b - 2)?;
                }
            }
            TForLoop | ExtraArg => {
                return Err(Self::fault(pc, op, "instruction without its leader"));
            }
        }
        Ok(Successor::Standalone)
    }

    /// Check the instruction at `pc` against what its predecessor requires
    fn check_successor(&self, pc: usize, required: Successor, inst: Instruction) -> Check {
        let op = inst.get_opcode();
        let expected = match required {
            Successor::Standalone => return Ok(()),
            Successor::ExtraArg | Successor::ExtraArgConstant => OpCode::ExtraArg,
            Successor::Jump => OpCode::Jmp,
            Successor::TForLoop => OpCode::TForLoop,
        };
        if op != Some(expected) {
            return Err(BytecodeFault {
                pc,
                opcode: op,
                reason: match required {
                    Successor::Jump => "test not followed by JMP",
                    Successor::TForLoop => "TFORCALL not followed by TFORLOOP",
                    _ => "missing EXTRAARG",
                },
            });
        }
        match required {
            Successor::ExtraArgConstant => self.konst(pc, expected, inst.get_ax()),
            Successor::Jump => self.jump(pc, expected, inst),
            Successor::TForLoop => {
                self.reg(pc, expected, inst.get_a() + 1)?;
                self.jump(pc, expected, inst)
            }
            _ => Ok(()),
        }
    }
}

/// Verify every instruction of `proto` (nested prototypes are not visited)
pub fn verify_proto(proto: &Proto) -> Result<(), BytecodeFault> {
    let v = Verifier {
        proto,
        max_stack: proto.max_stack_size as u32,
    };
    let code = &proto.code;
    let mut pc = 0;
    while pc < code.len() {
        let inst = code[pc];
        let op = inst.get_opcode().ok_or(BytecodeFault {
            pc,
            opcode: None,
            reason: "unknown opcode",
        })?;
        let required = v.check_instruction(pc, op, inst)?;
        if required != Successor::Standalone {
            let Some(&next) = code.get(pc + 1) else {
                return Err(Verifier::fault(pc, op, "paired instruction at end of code"));
            };
            pc += 1;
            v.check_successor(pc, required, next)?;
        }
        pc += 1;
    }
    Ok(())
}
