/*----------------------------------------------------------------------
  Lua 5.2 instruction layout (lopcodes.h)

  All instructions are unsigned 32-bit integers. The first 6 bits hold
  the opcode; the remaining fields depend on the format:

        3 3 2 2 2 2 2 2 2 2 2 2 1 1 1 1 1 1 1 1 1 1 0 0 0 0 0 0 0 0 0 0
        1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0
  iABC        B(9)       |       C(9)      |      A(8)     |   Op(6)   |
  iABx                 Bx(18)              |      A(8)     |   Op(6)   |
  iAsBx               sBx(18)              |      A(8)     |   Op(6)   |
  iAx                          Ax(26)                      |   Op(6)   |

  sBx is stored in excess-K form with K = MAXARG_Bx >> 1.
----------------------------------------------------------------------*/

use crate::OpCode;

/// A single 32-bit Lua 5.2 instruction
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction(u32);

impl Instruction {
    #[inline(always)]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    // Size of each field
    pub const SIZE_OP: u32 = 6;
    pub const SIZE_A: u32 = 8;
    pub const SIZE_B: u32 = 9;
    pub const SIZE_C: u32 = 9;
    pub const SIZE_BX: u32 = Self::SIZE_C + Self::SIZE_B; // 18
    pub const SIZE_AX: u32 = Self::SIZE_BX + Self::SIZE_A; // 26

    // Position of each field
    pub const POS_OP: u32 = 0;
    pub const POS_A: u32 = Self::POS_OP + Self::SIZE_OP;
    pub const POS_C: u32 = Self::POS_A + Self::SIZE_A;
    pub const POS_B: u32 = Self::POS_C + Self::SIZE_C;
    pub const POS_BX: u32 = Self::POS_C;
    pub const POS_AX: u32 = Self::POS_A;

    // Maximum values
    pub const MAX_A: u32 = (1 << Self::SIZE_A) - 1;
    pub const MAX_B: u32 = (1 << Self::SIZE_B) - 1;
    pub const MAX_C: u32 = (1 << Self::SIZE_C) - 1;
    pub const MAX_BX: u32 = (1 << Self::SIZE_BX) - 1;
    pub const MAX_AX: u32 = (1 << Self::SIZE_AX) - 1;

    pub const OFFSET_SBX: i32 = (Self::MAX_BX >> 1) as i32; // 131071

    /// Marks an RK operand as a constant index
    pub const BITRK: u32 = 1 << (Self::SIZE_B - 1);

    #[inline(always)]
    const fn mask1(n: u32, p: u32) -> u32 {
        (!((!0u32) << n)) << p
    }

    #[inline(always)]
    const fn mask0(n: u32, p: u32) -> u32 {
        !Self::mask1(n, p)
    }

    #[inline(always)]
    fn get_arg(self, pos: u32, size: u32) -> u32 {
        (self.0 >> pos) & Self::mask1(size, 0)
    }

    #[inline(always)]
    fn set_arg(&mut self, v: u32, pos: u32, size: u32) {
        self.0 = (self.0 & Self::mask0(size, pos)) | ((v << pos) & Self::mask1(size, pos));
    }

    /// Raw 6-bit opcode field, which may not name a valid opcode
    #[inline(always)]
    pub fn opcode_raw(self) -> u8 {
        self.get_arg(Self::POS_OP, Self::SIZE_OP) as u8
    }

    #[inline(always)]
    pub fn get_opcode(self) -> Option<OpCode> {
        OpCode::from_u8(self.opcode_raw())
    }

    #[inline(always)]
    pub fn set_opcode(&mut self, op: OpCode) {
        self.set_arg(op as u32, Self::POS_OP, Self::SIZE_OP);
    }

    #[inline(always)]
    pub fn get_a(self) -> u32 {
        self.get_arg(Self::POS_A, Self::SIZE_A)
    }

    #[inline(always)]
    pub fn set_a(&mut self, v: u32) {
        self.set_arg(v, Self::POS_A, Self::SIZE_A);
    }

    #[inline(always)]
    pub fn get_b(self) -> u32 {
        self.get_arg(Self::POS_B, Self::SIZE_B)
    }

    #[inline(always)]
    pub fn set_b(&mut self, v: u32) {
        self.set_arg(v, Self::POS_B, Self::SIZE_B);
    }

    #[inline(always)]
    pub fn get_c(self) -> u32 {
        self.get_arg(Self::POS_C, Self::SIZE_C)
    }

    #[inline(always)]
    pub fn set_c(&mut self, v: u32) {
        self.set_arg(v, Self::POS_C, Self::SIZE_C);
    }

    #[inline(always)]
    pub fn get_bx(self) -> u32 {
        self.get_arg(Self::POS_BX, Self::SIZE_BX)
    }

    #[inline(always)]
    pub fn set_bx(&mut self, v: u32) {
        self.set_arg(v, Self::POS_BX, Self::SIZE_BX);
    }

    #[inline(always)]
    pub fn get_sbx(self) -> i32 {
        self.get_bx() as i32 - Self::OFFSET_SBX
    }

    #[inline(always)]
    pub fn set_sbx(&mut self, v: i32) {
        self.set_bx((v + Self::OFFSET_SBX) as u32);
    }

    #[inline(always)]
    pub fn get_ax(self) -> u32 {
        self.get_arg(Self::POS_AX, Self::SIZE_AX)
    }

    #[inline(always)]
    pub fn set_ax(&mut self, v: u32) {
        self.set_arg(v, Self::POS_AX, Self::SIZE_AX);
    }

    pub fn create_abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        let mut i = Self(0);
        i.set_opcode(op);
        i.set_a(a);
        i.set_b(b);
        i.set_c(c);
        i
    }

    pub fn create_abx(op: OpCode, a: u32, bx: u32) -> Self {
        let mut i = Self(0);
        i.set_opcode(op);
        i.set_a(a);
        i.set_bx(bx);
        i
    }

    pub fn create_asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::create_abx(op, a, (sbx + Self::OFFSET_SBX) as u32)
    }

    pub fn create_ax(op: OpCode, ax: u32) -> Self {
        let mut i = Self(0);
        i.set_opcode(op);
        i.set_ax(ax);
        i
    }

    // RK(x): if ISK(x) then Kst(INDEXK(x)) else R(x)
    #[inline(always)]
    pub fn is_k(x: u32) -> bool {
        x & Self::BITRK != 0
    }

    #[inline(always)]
    pub fn rk_index(x: u32) -> u32 {
        x & !Self::BITRK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        assert_eq!(Instruction::POS_A, 6);
        assert_eq!(Instruction::POS_C, 14);
        assert_eq!(Instruction::POS_B, 23);
        assert_eq!(Instruction::POS_BX, 14);
        assert_eq!(Instruction::POS_AX, 6);
        assert_eq!(Instruction::OFFSET_SBX, 131071);
        assert_eq!(Instruction::BITRK, 256);
    }

    #[test]
    fn test_create_abc() {
        let i = Instruction::create_abc(OpCode::Call, 1, 2, 3);
        assert_eq!(i.get_opcode(), Some(OpCode::Call));
        assert_eq!(i.get_a(), 1);
        assert_eq!(i.get_b(), 2);
        assert_eq!(i.get_c(), 3);
        assert_eq!(i.as_u32(), 29 | (1 << 6) | (3 << 14) | (2 << 23));
    }

    #[test]
    fn test_max_fields() {
        let i = Instruction::create_abc(OpCode::Move, Instruction::MAX_A, Instruction::MAX_B, Instruction::MAX_C);
        assert_eq!(i.get_a(), 255);
        assert_eq!(i.get_b(), 511);
        assert_eq!(i.get_c(), 511);

        let i = Instruction::create_ax(OpCode::ExtraArg, Instruction::MAX_AX);
        assert_eq!(i.get_ax(), (1 << 26) - 1);
        assert_eq!(i.get_opcode(), Some(OpCode::ExtraArg));
    }

    #[test]
    fn test_signed_bx() {
        let back = Instruction::create_asbx(OpCode::Jmp, 0, -1);
        assert_eq!(back.get_sbx(), -1);
        assert_eq!(back.get_bx(), 131070);

        let fwd = Instruction::create_asbx(OpCode::ForPrep, 3, 10);
        assert_eq!(fwd.get_a(), 3);
        assert_eq!(fwd.get_sbx(), 10);
    }

    #[test]
    fn test_setters_do_not_clobber_neighbours() {
        let mut i = Instruction::create_abc(OpCode::Add, 10, 20, 30);
        i.set_b(Instruction::BITRK | 5);
        assert_eq!(i.get_a(), 10);
        assert_eq!(i.get_c(), 30);
        assert!(Instruction::is_k(i.get_b()));
        assert_eq!(Instruction::rk_index(i.get_b()), 5);
    }

    #[test]
    fn test_invalid_opcode_field() {
        let i = Instruction::from_u32(0x3F);
        assert_eq!(i.opcode_raw(), 63);
        assert_eq!(i.get_opcode(), None);
    }
}
