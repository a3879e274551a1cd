use crate::lua_vm::UndumpError;

/// Mark for precompiled code
pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
/// Major version * 16 + minor version
pub const LUAC_VERSION: u8 = 0x52;
/// The official format
pub const LUAC_FORMAT: u8 = 0;
/// Data to catch conversion errors
pub const LUAC_TAIL: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
/// Signature + version + format + 6 platform bytes + tail
pub const LUAC_HEADERSIZE: usize = LUA_SIGNATURE.len() + 2 + 6 + LUAC_TAIL.len();

// Prefix lengths that grade a header mismatch
const N1: usize = LUA_SIGNATURE.len();
const N2: usize = N1 + 2;
const N3: usize = N2 + 6;

/// Header this build writes and accepts
pub fn luac_header() -> [u8; LUAC_HEADERSIZE] {
    let mut h = [0u8; LUAC_HEADERSIZE];
    h[..N1].copy_from_slice(LUA_SIGNATURE);
    h[N1] = LUAC_VERSION;
    h[N1 + 1] = LUAC_FORMAT;
    h[N2] = u8::from(cfg!(target_endian = "little"));
    h[N2 + 1] = size_of::<i32>() as u8;
    h[N2 + 2] = size_of::<usize>() as u8;
    h[N2 + 3] = size_of::<u32>() as u8; // Instruction
    h[N2 + 4] = size_of::<f64>() as u8;
    h[N2 + 5] = 0; // lua_Number is not integral
    h[N3..].copy_from_slice(LUAC_TAIL);
    h
}

/// Compare a read header against ours, naming the first region that differs
pub(super) fn check_header(name: &str, h: &[u8; LUAC_HEADERSIZE]) -> Result<(), UndumpError> {
    let expected = luac_header();
    let name = name.to_string();
    if *h == expected {
        Ok(())
    } else if h[..N1] != expected[..N1] {
        Err(UndumpError::NotAChunk { name })
    } else if h[..N2] != expected[..N2] {
        Err(UndumpError::VersionMismatch { name })
    } else if h[..N3] != expected[..N3] {
        Err(UndumpError::Incompatible { name })
    } else {
        Err(UndumpError::Corrupted { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let h = luac_header();
        assert_eq!(LUAC_HEADERSIZE, 18);
        assert_eq!(&h[..4], b"\x1bLua");
        assert_eq!(h[4], 0x52);
        assert_eq!(h[5], 0);
        assert_eq!(h[7], 4);
        assert_eq!(h[9], 4);
        assert_eq!(h[10], 8);
        assert_eq!(h[11], 0);
        assert_eq!(&h[12..], LUAC_TAIL);
        assert!(check_header("x", &h).is_ok());
    }

    #[test]
    fn test_header_mismatch_grades() {
        let cases = [
            (0, UndumpError::NotAChunk { name: "x".into() }),
            (3, UndumpError::NotAChunk { name: "x".into() }),
            (4, UndumpError::VersionMismatch { name: "x".into() }),
            (5, UndumpError::VersionMismatch { name: "x".into() }),
            (6, UndumpError::Incompatible { name: "x".into() }),
            (10, UndumpError::Incompatible { name: "x".into() }),
            (12, UndumpError::Corrupted { name: "x".into() }),
            (17, UndumpError::Corrupted { name: "x".into() }),
        ];
        for (pos, expected) in cases {
            let mut h = luac_header();
            h[pos] ^= 0xff;
            assert_eq!(check_header("x", &h), Err(expected), "byte {}", pos);
        }
    }
}
