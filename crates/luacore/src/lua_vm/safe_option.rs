#[derive(Debug, Clone)]
pub struct SafeOption {
    /// Maximum memory, in bytes, the default collector accounts before refusing an allocation
    pub max_memory_limit: isize,
    /// Seed for string content hashing
    pub string_seed: u64,
}

impl Default for SafeOption {
    fn default() -> Self {
        Self {
            max_memory_limit: isize::MAX,
            string_seed: 0x2545_f491_4f6c_dd1d,
        }
    }
}
