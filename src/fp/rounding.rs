/// IEEE-754 / ARM rounding modes. The raw values match the encoding the IR
/// carries in `ToFixed` immediates; the first four match FPSCR.RMode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoundingMode {
    ToNearestTieEven = 0,
    TowardsPlusInfinity = 1,
    TowardsMinusInfinity = 2,
    TowardsZero = 3,
    ToNearestTieAwayFromZero = 4,
}

impl RoundingMode {
    pub const ALL: [RoundingMode; 5] = [
        RoundingMode::ToNearestTieEven,
        RoundingMode::TowardsPlusInfinity,
        RoundingMode::TowardsMinusInfinity,
        RoundingMode::TowardsZero,
        RoundingMode::ToNearestTieAwayFromZero,
    ];

    pub fn from_u8(value: u8) -> RoundingMode {
        match value {
            0 => RoundingMode::ToNearestTieEven,
            1 => RoundingMode::TowardsPlusInfinity,
            2 => RoundingMode::TowardsMinusInfinity,
            3 => RoundingMode::TowardsZero,
            4 => RoundingMode::ToNearestTieAwayFromZero,
            _ => panic!("invalid rounding mode {}", value),
        }
    }
}
