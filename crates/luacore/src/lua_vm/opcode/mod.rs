mod instruction;

pub use instruction::Instruction;

/// Instruction format modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    IABC,
    IABx,
    IAsBx,
    IAx,
}

/// Lua 5.2 opcode set (40 opcodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0, // R(A) := R(B)
    LoadK,    // R(A) := Kst(Bx)
    LoadKX,   // R(A) := Kst(extra arg)
    LoadBool, // R(A) := (Bool)B; if (C) pc++
    LoadNil,  // R(A), R(A+1), ..., R(A+B) := nil
    GetUpval, // R(A) := UpValue[B]

    GetTabUp, // R(A) := UpValue[B][RK(C)]
    GetTable, // R(A) := R(B)[RK(C)]

    SetTabUp, // UpValue[A][RK(B)] := RK(C)
    SetUpval, // UpValue[B] := R(A)
    SetTable, // R(A)[RK(B)] := RK(C)

    NewTable, // R(A) := {} (size = B,C)

    Self_, // R(A+1) := R(B); R(A) := R(B)[RK(C)]

    Add, // R(A) := RK(B) + RK(C)
    Sub, // R(A) := RK(B) - RK(C)
    Mul, // R(A) := RK(B) * RK(C)
    Div, // R(A) := RK(B) / RK(C)
    Mod, // R(A) := RK(B) % RK(C)
    Pow, // R(A) := RK(B) ^ RK(C)
    Unm, // R(A) := -R(B)
    Not, // R(A) := not R(B)
    Len, // R(A) := length of R(B)

    Concat, // R(A) := R(B).. ... ..R(C)

    Jmp, // pc += sBx; if (A) close all upvalues >= R(A - 1)
    Eq,  // if ((RK(B) == RK(C)) ~= A) then pc++
    Lt,  // if ((RK(B) <  RK(C)) ~= A) then pc++
    Le,  // if ((RK(B) <= RK(C)) ~= A) then pc++

    Test,    // if not (R(A) <=> C) then pc++
    TestSet, // if (R(B) <=> C) then R(A) := R(B) else pc++

    Call,     // R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))
    TailCall, // return R(A)(R(A+1), ... ,R(A+B-1))
    Return,   // return R(A), ... ,R(A+B-2)

    ForLoop, // R(A)+=R(A+2); if R(A) <?= R(A+1) then { pc+=sBx; R(A+3)=R(A) }
    ForPrep, // R(A)-=R(A+2); pc+=sBx

    TForCall, // R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2))
    TForLoop, // if R(A+1) ~= nil then { R(A)=R(A+1); pc += sBx }

    SetList, // R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B

    Closure, // R(A) := closure(KPROTO[Bx])

    Vararg, // R(A), R(A+1), ..., R(A+B-2) = vararg

    ExtraArg, // extra (larger) argument for previous opcode
}

impl OpCode {
    pub const COUNT: usize = OpCode::ExtraArg as usize + 1;

    const ALL: [OpCode; OpCode::COUNT] = {
        use OpCode::*;
        [
            Move, LoadK, LoadKX, LoadBool, LoadNil, GetUpval, GetTabUp, GetTable, SetTabUp,
            SetUpval, SetTable, NewTable, Self_, Add, Sub, Mul, Div, Mod, Pow, Unm, Not, Len,
            Concat, Jmp, Eq, Lt, Le, Test, TestSet, Call, TailCall, Return, ForLoop, ForPrep,
            TForCall, TForLoop, SetList, Closure, Vararg, ExtraArg,
        ]
    };

    /// Decode an opcode number; `None` for anything past EXTRAARG
    #[inline(always)]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Get the instruction format mode for this opcode
    /// Based on the Lua 5.2 lopcodes.c luaP_opmodes table
    pub fn get_mode(self) -> OpMode {
        use OpCode::*;
        match self {
            LoadK | LoadKX | Closure => OpMode::IABx,
            Jmp | ForLoop | ForPrep | TForLoop => OpMode::IAsBx,
            ExtraArg => OpMode::IAx,
            _ => OpMode::IABC,
        }
    }

    /// Upper-case mnemonic as printed by luac listings
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadKX => "LOADKX",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            SetTabUp => "SETTABUP",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Pow => "POW",
            Unm => "UNM",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            Vararg => "VARARG",
            ExtraArg => "EXTRAARG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_covers_all_opcodes() {
        for i in 0..OpCode::COUNT {
            let op = OpCode::from_u8(i as u8).unwrap();
            assert_eq!(op as usize, i);
        }
        assert_eq!(OpCode::from_u8(40), None);
        assert_eq!(OpCode::from_u8(63), None);
    }

    #[test]
    fn test_modes() {
        assert_eq!(OpCode::LoadK.get_mode(), OpMode::IABx);
        assert_eq!(OpCode::Jmp.get_mode(), OpMode::IAsBx);
        assert_eq!(OpCode::TForLoop.get_mode(), OpMode::IAsBx);
        assert_eq!(OpCode::ExtraArg.get_mode(), OpMode::IAx);
        assert_eq!(OpCode::Call.get_mode(), OpMode::IABC);
        assert_eq!(OpCode::Self_.name(), "SELF");
    }
}
