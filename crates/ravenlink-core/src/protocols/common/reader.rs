/// Device firmware reports a zero scale factor to mean "unity".
pub(crate) fn unity_if_zero(value: u64) -> u64 {
    if value == 0 { 1 } else { value }
}
