//! ARM-priority NaN selection.
//!
//! When an operation has NaN operands, the architecture picks the first
//! signaling NaN in operand order, quieted; failing that, the first quiet
//! NaN. The selected NaN (not the host's choice) becomes the result.

use crate::fp::info::*;

/// Two-operand NaN selection. Returns the chosen NaN, or None when neither
/// operand is a NaN.
pub fn process_nans32(op1: u32, op2: u32) -> Option<u32> {
    if f32_is_snan(op1) {
        Some(f32_quiet(op1))
    } else if f32_is_snan(op2) {
        Some(f32_quiet(op2))
    } else if f32_is_qnan(op1) {
        Some(op1)
    } else if f32_is_qnan(op2) {
        Some(op2)
    } else {
        None
    }
}

/// Three-operand NaN selection.
pub fn process_nans3_32(op1: u32, op2: u32, op3: u32) -> Option<u32> {
    if f32_is_snan(op1) {
        Some(f32_quiet(op1))
    } else if f32_is_snan(op2) {
        Some(f32_quiet(op2))
    } else if f32_is_snan(op3) {
        Some(f32_quiet(op3))
    } else if f32_is_qnan(op1) {
        Some(op1)
    } else if f32_is_qnan(op2) {
        Some(op2)
    } else if f32_is_qnan(op3) {
        Some(op3)
    } else {
        None
    }
}

pub fn process_nans64(op1: u64, op2: u64) -> Option<u64> {
    if f64_is_snan(op1) {
        Some(f64_quiet(op1))
    } else if f64_is_snan(op2) {
        Some(f64_quiet(op2))
    } else if f64_is_qnan(op1) {
        Some(op1)
    } else if f64_is_qnan(op2) {
        Some(op2)
    } else {
        None
    }
}

pub fn process_nans3_64(op1: u64, op2: u64, op3: u64) -> Option<u64> {
    if f64_is_snan(op1) {
        Some(f64_quiet(op1))
    } else if f64_is_snan(op2) {
        Some(f64_quiet(op2))
    } else if f64_is_snan(op3) {
        Some(f64_quiet(op3))
    } else if f64_is_qnan(op1) {
        Some(op1)
    } else if f64_is_qnan(op2) {
        Some(op2)
    } else if f64_is_qnan(op3) {
        Some(op3)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QNAN: u32 = 0x7FC1_2345;
    const SNAN: u32 = 0x7F81_2345;

    #[test]
    fn test_no_nan() {
        assert_eq!(process_nans32(0x3F80_0000, 0x4000_0000), None);
    }

    #[test]
    fn test_snan_beats_qnan() {
        // SNaN in either position wins over a QNaN, and comes out quieted.
        assert_eq!(process_nans32(QNAN, SNAN), Some(f32_quiet(SNAN)));
        assert_eq!(process_nans32(SNAN, QNAN), Some(f32_quiet(SNAN)));
    }

    #[test]
    fn test_first_operand_order() {
        let qnan2 = 0x7FC0_0001;
        assert_eq!(process_nans32(QNAN, qnan2), Some(QNAN));
        assert_eq!(process_nans32(qnan2, QNAN), Some(qnan2));
    }

    #[test]
    fn test_three_operand_priority() {
        assert_eq!(process_nans3_32(1.0f32.to_bits(), QNAN, SNAN), Some(f32_quiet(SNAN)));
        assert_eq!(process_nans3_32(1.0f32.to_bits(), 2.0f32.to_bits(), QNAN), Some(QNAN));
        assert_eq!(process_nans3_32(1.0f32.to_bits(), 2.0f32.to_bits(), 3.0f32.to_bits()), None);
    }

    #[test]
    fn test_f64_selection() {
        let snan = 0x7FF0_0000_0000_0001u64;
        let qnan = 0x7FF8_0000_0000_0002u64;
        assert_eq!(process_nans64(qnan, snan), Some(f64_quiet(snan)));
        assert_eq!(process_nans64(1.0f64.to_bits(), qnan), Some(qnan));
    }
}
