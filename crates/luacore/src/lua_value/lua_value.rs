use std::fmt;

use super::LuaString;
use crate::LuaResult;
use crate::gc::GcId;

// Basic type tags, shared with the precompiled chunk constant encoding
pub const LUA_TNIL: u8 = 0;
pub const LUA_TBOOLEAN: u8 = 1;
pub const LUA_TLIGHTUSERDATA: u8 = 2;
pub const LUA_TNUMBER: u8 = 3;
pub const LUA_TSTRING: u8 = 4;
pub const LUA_TTABLE: u8 = 5;
pub const LUA_TFUNCTION: u8 = 6;
pub const LUA_TUSERDATA: u8 = 7;
pub const LUA_TTHREAD: u8 = 8;

/// Native function pointer
pub type CFunction = fn(&[LuaValue]) -> LuaResult<Vec<LuaValue>>;

/// A Lua value.
///
/// The value never owns a heap object: `Object` is a handle into the host collector.
/// Strings are shared immutable byte strings (see `LuaString`).
#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(LuaString),
    LightUserdata(usize),
    CFunction(CFunction),
    Object(GcId),
}

impl LuaValue {
    #[inline(always)]
    pub const fn nil() -> Self {
        LuaValue::Nil
    }

    #[inline(always)]
    pub const fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline(always)]
    pub const fn number(n: f64) -> Self {
        LuaValue::Number(n)
    }

    #[inline(always)]
    pub fn integer(i: i64) -> Self {
        LuaValue::Number(i as f64)
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Values a collector must hear about when they are stored somewhere
    #[inline(always)]
    pub fn is_collectable(&self) -> bool {
        matches!(self, LuaValue::String(_) | LuaValue::Object(_))
    }

    #[inline(always)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The integer this value denotes, if it is a number with an exact integral value
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Number(n) => number_to_integer(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&LuaString> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> u8 {
        match self {
            LuaValue::Nil => LUA_TNIL,
            LuaValue::Boolean(_) => LUA_TBOOLEAN,
            LuaValue::Number(_) => LUA_TNUMBER,
            LuaValue::String(_) => LUA_TSTRING,
            LuaValue::LightUserdata(_) => LUA_TLIGHTUSERDATA,
            LuaValue::CFunction(_) => LUA_TFUNCTION,
            LuaValue::Object(id) => match id.kind() {
                crate::gc::GcKind::Table => LUA_TTABLE,
                crate::gc::GcKind::Function => LUA_TFUNCTION,
                crate::gc::GcKind::Userdata => LUA_TUSERDATA,
                crate::gc::GcKind::Thread => LUA_TTHREAD,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.type_tag() {
            LUA_TNIL => "nil",
            LUA_TBOOLEAN => "boolean",
            LUA_TNUMBER => "number",
            LUA_TSTRING => "string",
            LUA_TTABLE => "table",
            LUA_TFUNCTION => "function",
            LUA_TTHREAD => "thread",
            _ => "userdata",
        }
    }
}

/// Exact f64 -> i64 conversion; `None` for fractions, NaN, infinities and out-of-range values
#[inline]
pub fn number_to_integer(n: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if n >= -LIMIT && n < LIMIT && n.trunc() == n {
        Some(n as i64)
    } else {
        None
    }
}

/// Raw equality: no metamethods, numbers by value, long strings by content
impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::LightUserdata(a), LuaValue::LightUserdata(b)) => a == b,
            (LuaValue::CFunction(a), LuaValue::CFunction(b)) => *a as usize == *b as usize,
            (LuaValue::Object(a), LuaValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Number(n) => write!(f, "{}", n),
            LuaValue::String(s) => write!(f, "{:?}", s),
            LuaValue::LightUserdata(p) => write!(f, "userdata: {:#x}", p),
            LuaValue::CFunction(func) => write!(f, "function: builtin: {:#x}", *func as usize),
            LuaValue::Object(id) => write!(f, "{}: {:?}#{}", self.type_name(), id.kind(), id.index()),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::integer(i)
    }
}

impl From<LuaString> for LuaValue {
    fn from(s: LuaString) -> Self {
        LuaValue::String(s)
    }
}

impl From<GcId> for LuaValue {
    fn from(id: GcId) -> Self {
        LuaValue::Object(id)
    }
}
