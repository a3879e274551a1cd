pub mod test_undump;
pub mod test_verify;
