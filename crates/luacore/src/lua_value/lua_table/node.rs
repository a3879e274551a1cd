use std::cell::Cell;

use crate::LuaValue;

/// Hash part node: key/value pair, collision chain link and insertion-order links.
///
/// All links are indices into the same node vector. The order links live in `Cell`s
/// because lookups relocate dead nodes through a shared reference.
#[derive(Debug, Default)]
pub struct Node {
    pub(crate) key: LuaValue,
    pub(crate) value: LuaValue,
    /// Next node of the same collision chain
    pub(crate) chain: Option<u32>,
    pub(crate) order_prev: Cell<Option<u32>>,
    pub(crate) order_next: Cell<Option<u32>>,
}

impl Node {
    /// Never assigned a key since the hash part was allocated
    #[inline(always)]
    pub(crate) fn is_free(&self) -> bool {
        self.key.is_nil()
    }
}

/// Split a finite non-zero number into a mantissa in [0.5, 1) and a power of two
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i32;
    if exp == 0 {
        // subnormal: scale into the normal range first
        let (m, e) = frexp(x * f64::from_bits(0x43f0_0000_0000_0000)); // 2^64
        return (m, e - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, exp - 1022)
}

/// Hash of a number key: mantissa scaled to 31 bits plus the exponent, folded non-negative
pub(crate) fn hash_number(n: f64) -> u32 {
    let (m, e) = frexp(n);
    let mut i = ((m * 2_147_483_648.0) as i64 as i32).wrapping_add(e);
    if i < 0 {
        // i32::MIN has no positive counterpart
        i = if i == i32::MIN { 0 } else { -i };
    }
    i as u32
}

#[inline(always)]
fn hashpow2(h: u64, size: usize) -> usize {
    (h as usize) & (size - 1)
}

/// Modulus by an odd number; pointer-like and numeric hashes have many factors of 2
#[inline(always)]
fn hashmod(h: u32, size: usize) -> usize {
    (h as usize) % ((size - 1) | 1)
}

/// Natural slot of `key` in a hash part of `size` nodes (`size` is a power of two)
pub(crate) fn main_position(key: &LuaValue, size: usize) -> usize {
    debug_assert!(size.is_power_of_two());
    match key {
        LuaValue::Number(n) => hashmod(hash_number(*n), size),
        LuaValue::String(s) => hashpow2(s.hash(), size),
        LuaValue::Boolean(b) => hashpow2(*b as u64, size),
        LuaValue::LightUserdata(p) => hashmod(*p as u32, size),
        LuaValue::CFunction(f) => hashmod(*f as usize as u32, size),
        LuaValue::Object(id) => hashmod(id.raw_bits() as u32, size),
        LuaValue::Nil => 0,
    }
}

/// Smallest `l` with 2^l >= x (x >= 1)
#[inline]
pub(crate) fn ceil_log2(x: usize) -> u32 {
    debug_assert!(x > 0);
    usize::BITS - (x - 1).leading_zeros()
}
