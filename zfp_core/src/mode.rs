//! Compression modes and the low-level budget parameters behind them.
//!
//! Every mode reduces to four numbers ([`Params`]): the minimum and maximum
//! number of bits per block, the maximum number of bit planes coded, and the
//! smallest bit plane exponent coded. The header stores a mode as a 12-bit
//! short code when one exists, otherwise as a 64-bit long code.

use crate::error::{Result, ZfpError};
use crate::scalar::{frexp_exponent, ldexp, ScalarType};
use crate::shape::block_len;

pub const MIN_BITS: u32 = 1;
pub const MAX_BITS: u32 = 16658;
pub const MAX_PREC: u32 = 64;
pub const MIN_EXP: i32 = -1074;

/// Width of a short mode code.
pub const SHORT_MODE_BITS: u32 = 12;
/// Width of a long mode code, including its 12-bit escape.
pub const LONG_MODE_BITS: u32 = 64;
/// Largest short code; `0xfff` escapes to the long form.
pub const SHORT_MODE_MAX: u64 = 0xffe;

const RATE_CODES: u64 = 2048;
const PRECISION_CODES: u64 = 128;
const REVERSIBLE_CODE: u64 = RATE_CODES + PRECISION_CODES;
const ACCURACY_BASE: u64 = REVERSIBLE_CODE + 1;
const MAX_SHORT_MIN_EXP: i32 = 843;
const LONG_MIN_EXP_BIAS: i32 = 16495;

/// Fixed-rate block sizes are rounded up to this many bits so that blocks
/// can be rewritten independently.
pub const WORD_BITS: u32 = 64;

/// Smallest block that can be coded for `scalar`: a flag bit, plus the
/// exponent for floating types.
#[inline]
fn min_block_bits(scalar: ScalarType) -> u32 {
    1 + scalar.exponent_bits().unwrap_or(0)
}

/// Raw per-block budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    pub minbits: u32,
    pub maxbits: u32,
    pub maxprec: u32,
    pub minexp: i32,
}

impl Params {
    /// Every block occupies exactly `maxbits` bits.
    #[inline]
    pub fn is_fixed_rate(&self) -> bool {
        self.minbits == self.maxbits
    }
}

/// How a field trades size for accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Every block is exactly `block_bits` bits.
    FixedRate { block_bits: u32 },
    /// Code `precision` bit planes per block.
    FixedPrecision { precision: u32 },
    /// Code bit planes down to `2^min_exp`.
    FixedAccuracy { min_exp: i32 },
    Expert(Params),
}

impl Mode {
    /// Fixed rate of `rate` bits per value, rounded to a whole number of
    /// bits per block, raised to hold at least the block exponent, capped at
    /// [`MAX_BITS`], and aligned to a 64-bit word.
    pub fn fixed_rate(rate: f64, scalar: ScalarType, dims: usize) -> Self {
        let values = block_len(dims) as f64;
        let bits = (values * rate + 0.5).floor().max(0.0) as u32;
        let bits = bits.clamp(min_block_bits(scalar), MAX_BITS);
        let bits = (bits + WORD_BITS - 1) & !(WORD_BITS - 1);
        Mode::FixedRate { block_bits: bits }
    }

    pub fn fixed_precision(precision: u32) -> Self {
        Mode::FixedPrecision {
            precision: precision.clamp(1, MAX_PREC),
        }
    }

    /// Smallest bit plane exponent whose weight does not exceed `tolerance`.
    /// A non-positive tolerance codes every bit plane.
    pub fn fixed_accuracy(tolerance: f64) -> Self {
        let min_exp = if tolerance > 0.0 && tolerance.is_finite() {
            (frexp_exponent(tolerance) - 1).max(MIN_EXP)
        } else {
            MIN_EXP
        };
        Mode::FixedAccuracy { min_exp }
    }

    pub fn params(&self) -> Params {
        match *self {
            Mode::FixedRate { block_bits } => Params {
                minbits: block_bits,
                maxbits: block_bits,
                maxprec: MAX_PREC,
                minexp: MIN_EXP,
            },
            Mode::FixedPrecision { precision } => Params {
                minbits: MIN_BITS,
                maxbits: MAX_BITS,
                maxprec: precision,
                minexp: MIN_EXP,
            },
            Mode::FixedAccuracy { min_exp } => Params {
                minbits: MIN_BITS,
                maxbits: MAX_BITS,
                maxprec: MAX_PREC,
                minexp: min_exp,
            },
            Mode::Expert(params) => params,
        }
    }

    /// Classifies raw parameters, falling back to `Expert`.
    pub fn from_params(p: Params) -> Self {
        if p.minbits == p.maxbits && p.maxprec >= MAX_PREC && p.minexp <= MIN_EXP {
            Mode::FixedRate {
                block_bits: p.maxbits,
            }
        } else if p.minbits <= MIN_BITS && p.maxbits >= MAX_BITS && p.minexp <= MIN_EXP {
            Mode::FixedPrecision {
                precision: p.maxprec,
            }
        } else if p.minbits <= MIN_BITS && p.maxbits >= MAX_BITS && p.maxprec >= MAX_PREC {
            Mode::FixedAccuracy { min_exp: p.minexp }
        } else {
            Mode::Expert(p)
        }
    }

    #[inline]
    pub fn is_fixed_rate(&self) -> bool {
        self.params().is_fixed_rate()
    }

    /// Bits per block when every block has the same size.
    pub fn block_bits(&self) -> Option<u32> {
        let p = self.params();
        p.is_fixed_rate().then_some(p.maxbits)
    }

    /// Bits per value for fixed-rate modes.
    pub fn rate(&self, dims: usize) -> Option<f64> {
        self.block_bits()
            .map(|bits| bits as f64 / block_len(dims) as f64)
    }

    pub fn precision(&self) -> Option<u32> {
        match *self {
            Mode::FixedPrecision { precision } => Some(precision),
            _ => None,
        }
    }

    /// Absolute error tolerance for fixed-accuracy mode (`2^min_exp`).
    pub fn tolerance(&self) -> Option<f64> {
        match *self {
            Mode::FixedAccuracy { min_exp } => Some(ldexp(1.0, min_exp)),
            _ => None,
        }
    }

    /// Fails when the largest block this mode allows cannot hold the flag
    /// and exponent that open every non-zero block of `scalar`.
    pub fn check_budget(&self, scalar: ScalarType) -> Result<()> {
        let bits = self.params().maxbits;
        let required = min_block_bits(scalar);
        if bits < required {
            return Err(ZfpError::BlockBudgetTooSmall { bits, required });
        }
        Ok(())
    }

    /// The 12-bit code, if this mode has one.
    pub fn short_code(&self) -> Option<u64> {
        match *self {
            Mode::FixedRate { block_bits } if (1..=RATE_CODES as u32).contains(&block_bits) => {
                Some(block_bits as u64 - 1)
            }
            Mode::FixedPrecision { precision } if (1..=PRECISION_CODES as u32).contains(&precision) => {
                Some(RATE_CODES + precision as u64 - 1)
            }
            Mode::FixedAccuracy { min_exp } if (MIN_EXP..=MAX_SHORT_MIN_EXP).contains(&min_exp) => {
                Some((min_exp - MIN_EXP) as u64 + ACCURACY_BASE)
            }
            Mode::Expert(p) => match Mode::from_params(p) {
                Mode::Expert(_) => None,
                mode => mode.short_code(),
            },
            _ => None,
        }
    }

    /// Short code when available, otherwise the 64-bit long code.
    pub fn code(&self) -> u64 {
        if let Some(code) = self.short_code() {
            return code;
        }
        let p = self.params();
        let minbits = p.minbits.clamp(1, 0x8000) as u64 - 1;
        let maxbits = p.maxbits.clamp(1, 0x8000) as u64 - 1;
        let maxprec = p.maxprec.clamp(1, 0x80) as u64 - 1;
        let minexp = (p.minexp.saturating_add(LONG_MIN_EXP_BIAS)).clamp(0, 0x7fff) as u64;
        let mut code = minexp;
        code = (code << 7) + maxprec;
        code = (code << 15) + maxbits;
        code = (code << 15) + minbits;
        (code << SHORT_MODE_BITS) + 0xfff
    }

    pub fn from_code(code: u64) -> Result<Self> {
        let short = code & 0xfff;
        if short <= SHORT_MODE_MAX {
            return if short < RATE_CODES {
                Ok(Mode::FixedRate {
                    block_bits: short as u32 + 1,
                })
            } else if short < REVERSIBLE_CODE {
                Ok(Mode::FixedPrecision {
                    precision: (short - RATE_CODES) as u32 + 1,
                })
            } else if short == REVERSIBLE_CODE {
                Err(ZfpError::UnsupportedMode(code))
            } else {
                Ok(Mode::FixedAccuracy {
                    min_exp: (short - ACCURACY_BASE) as i32 + MIN_EXP,
                })
            };
        }
        let params = Params {
            minbits: ((code >> 12) & 0x7fff) as u32 + 1,
            maxbits: ((code >> 27) & 0x7fff) as u32 + 1,
            maxprec: ((code >> 42) & 0x7f) as u32 + 1,
            minexp: ((code >> 49) & 0x7fff) as i32 - LONG_MIN_EXP_BIAS,
        };
        Ok(Mode::from_params(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rate_word_alignment() {
        assert_eq!(
            Mode::fixed_rate(32.0, ScalarType::Double, 3),
            Mode::FixedRate { block_bits: 2048 }
        );
        assert_eq!(
            Mode::fixed_rate(33.0, ScalarType::Double, 3),
            Mode::FixedRate { block_bits: 2112 }
        );
        // 4 values * 12 bits = 48, rounded up to one word
        assert_eq!(Mode::fixed_rate(12.0, ScalarType::Float, 1).rate(1), Some(16.0));
        // never smaller than the exponent field plus its flag
        assert_eq!(
            Mode::fixed_rate(0.0, ScalarType::Double, 1),
            Mode::FixedRate { block_bits: 64 }
        );
    }

    #[test]
    fn test_fixed_rate_huge_rate_is_capped() {
        // 64 * 1e9 bits saturates the float-to-int cast
        assert_eq!(
            Mode::fixed_rate(1e9, ScalarType::Double, 3),
            Mode::FixedRate { block_bits: 16704 }
        );
        assert_eq!(
            Mode::fixed_rate(f64::INFINITY, ScalarType::Float, 1),
            Mode::FixedRate { block_bits: 16704 }
        );
        assert_eq!(
            Mode::fixed_rate(f64::NAN, ScalarType::Float, 1),
            Mode::FixedRate { block_bits: 64 }
        );
    }

    #[test]
    fn test_budget_check() {
        let tight = Mode::FixedRate { block_bits: 11 };
        assert_eq!(
            tight.check_budget(ScalarType::Double),
            Err(ZfpError::BlockBudgetTooSmall { bits: 11, required: 12 })
        );
        assert!(tight.check_budget(ScalarType::Float).is_ok());
        assert!(Mode::fixed_precision(1).check_budget(ScalarType::Double).is_ok());
        let expert = Mode::Expert(Params {
            minbits: 1,
            maxbits: 4,
            maxprec: 64,
            minexp: -20,
        });
        assert!(expert.check_budget(ScalarType::Float).is_err());
        assert!(expert.check_budget(ScalarType::Int64).is_ok());
    }

    #[test]
    fn test_fixed_accuracy_tolerance() {
        let mode = Mode::fixed_accuracy(1e-3);
        assert_eq!(mode, Mode::FixedAccuracy { min_exp: -10 });
        assert_eq!(mode.tolerance(), Some(1.0 / 1024.0));
        assert_eq!(
            Mode::fixed_accuracy(0.0),
            Mode::FixedAccuracy { min_exp: MIN_EXP }
        );
    }

    #[test]
    fn test_short_codes() {
        assert_eq!(Mode::FixedRate { block_bits: 1 }.short_code(), Some(0));
        assert_eq!(Mode::FixedRate { block_bits: 2048 }.short_code(), Some(2047));
        assert_eq!(Mode::FixedRate { block_bits: 2049 }.short_code(), None);
        assert_eq!(Mode::FixedPrecision { precision: 1 }.short_code(), Some(2048));
        assert_eq!(
            Mode::FixedAccuracy { min_exp: MIN_EXP }.short_code(),
            Some(2177)
        );
        assert_eq!(
            Mode::FixedAccuracy { min_exp: 843 }.short_code(),
            Some(SHORT_MODE_MAX)
        );
    }

    #[test]
    fn test_codes_roundtrip() {
        let modes = [
            Mode::FixedRate { block_bits: 64 },
            Mode::FixedRate { block_bits: 2112 },
            Mode::FixedPrecision { precision: 20 },
            Mode::FixedAccuracy { min_exp: -30 },
            Mode::FixedAccuracy { min_exp: 900 },
            Mode::Expert(Params {
                minbits: 16,
                maxbits: 512,
                maxprec: 40,
                minexp: -20,
            }),
        ];
        for mode in modes {
            assert_eq!(Mode::from_code(mode.code()).unwrap(), mode, "{mode:?}");
        }
    }

    #[test]
    fn test_reversible_code_rejected() {
        assert_eq!(
            Mode::from_code(REVERSIBLE_CODE),
            Err(ZfpError::UnsupportedMode(REVERSIBLE_CODE))
        );
    }

    #[test]
    fn test_expert_params_classified() {
        let p = Mode::fixed_precision(16).params();
        assert_eq!(Mode::from_params(p), Mode::FixedPrecision { precision: 16 });
        assert_eq!(Mode::Expert(p).short_code(), Some(2048 + 15));
    }
}
