use crate::fp::rounding::RoundingMode;
use crate::fp::Fpcr;
use crate::frontend::thumb::fpscr::FPSCR;
use crate::ir::location::A32LocationDescriptor;

/// Per-block emission context: the block's location (whose FPSCR mode bits
/// parameterize every FP op) and emitter configuration.
pub struct EmitContext {
    /// Location descriptor of the block being compiled.
    pub location: A32LocationDescriptor,
    /// Whether NaN propagation must match the architecture bit-for-bit.
    /// When false the backend may use the host's native NaN behavior.
    pub accurate_nan: bool,
}

impl EmitContext {
    pub fn new(location: A32LocationDescriptor) -> Self {
        Self {
            location,
            accurate_nan: true,
        }
    }

    pub fn with_accurate_nan(location: A32LocationDescriptor, accurate_nan: bool) -> Self {
        Self {
            location,
            accurate_nan,
        }
    }

    pub fn fpscr(&self) -> FPSCR {
        self.location.fpscr()
    }

    /// FPCR.DN: Default-NaN mode.
    pub fn fpscr_dn(&self) -> bool {
        self.fpscr().dn()
    }

    pub fn fpscr_rmode(&self) -> RoundingMode {
        self.fpscr().rmode()
    }

    pub fn accurate_nan(&self) -> bool {
        self.accurate_nan
    }

    /// The control word handed to scalar helper calls.
    pub fn fpcr(&self) -> Fpcr {
        Fpcr::new(self.fpscr().value())
    }
}
