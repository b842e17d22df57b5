use std::fmt;

/// Scalar types a zfp stream can describe.
///
/// The discriminants are the on-disk tags; the header stores `tag - 1` in
/// two bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarType {
    Int32 = 1,
    Int64 = 2,
    Float = 3,
    Double = 4,
}

impl ScalarType {
    /// Decodes the two-bit header field.
    pub fn from_header_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => ScalarType::Int32,
            1 => ScalarType::Int64,
            2 => ScalarType::Float,
            _ => ScalarType::Double,
        }
    }

    pub fn header_bits(self) -> u64 {
        self as u64 - 1
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }

    /// Width of the integer representation used by the block transform.
    #[inline]
    pub fn precision_bits(self) -> u32 {
        match self {
            ScalarType::Int32 | ScalarType::Float => 32,
            ScalarType::Int64 | ScalarType::Double => 64,
        }
    }

    /// Bits used to store a block's common exponent, `None` for integers.
    #[inline]
    pub fn exponent_bits(self) -> Option<u32> {
        match self {
            ScalarType::Float => Some(8),
            ScalarType::Double => Some(11),
            _ => None,
        }
    }

    #[inline]
    pub fn exponent_bias(self) -> i32 {
        match self {
            ScalarType::Float => 127,
            ScalarType::Double => 1023,
            _ => 0,
        }
    }

    pub fn size_bytes(self) -> usize {
        self.precision_bits() as usize / 8
    }

    /// Suffix used in array type names (`array3f`, `array3d`).
    pub fn suffix(self) -> char {
        match self {
            ScalarType::Int32 => 'i',
            ScalarType::Int64 => 'l',
            ScalarType::Float => 'f',
            ScalarType::Double => 'd',
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        };
        f.write_str(name)
    }
}

/// A value type the block codec can compress.
///
/// Floating types go through the block-floating-point conversion and use
/// `to_f64`/`from_f64`; integer types are coded directly through
/// `to_i64`/`from_i64`.
pub trait Scalar: Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const TYPE: ScalarType;

    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
    fn to_i64(self) -> i64;
    fn from_i64(value: i64) -> Self;
}

macro_rules! impl_scalar {
    ($t:ty, $tag:expr) => {
        impl Scalar for $t {
            const TYPE: ScalarType = $tag;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }

            #[inline]
            fn from_i64(value: i64) -> Self {
                value as $t
            }
        }
    };
}

impl_scalar!(i32, ScalarType::Int32);
impl_scalar!(i64, ScalarType::Int64);
impl_scalar!(f32, ScalarType::Float);
impl_scalar!(f64, ScalarType::Double);

/// Exponent `e` such that `x = f * 2^e` with `f` in `[0.5, 1)`, for finite
/// positive `x`.
pub(crate) fn frexp_exponent(x: f64) -> i32 {
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // subnormal: x = mantissa * 2^-1074
        let mantissa = bits & ((1u64 << 52) - 1);
        64 - mantissa.leading_zeros() as i32 - 1074
    } else {
        biased - 1022
    }
}

/// `x * 2^e` without overflowing the intermediate power of two.
pub(crate) fn ldexp(mut x: f64, mut e: i32) -> f64 {
    const UP: f64 = 8.98846567431158e307; // 2^1023
    const DOWN: f64 = f64::MIN_POSITIVE; // 2^-1022
    while e > 1023 {
        x *= UP;
        e -= 1023;
    }
    while e < -1022 {
        x *= DOWN;
        e += 1022;
    }
    x * f64::from_bits(((e + 1023) as u64) << 52)
}
