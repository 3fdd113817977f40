use crate::{CoreError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;
use tracing::warn;

/// Nano-units per whole unit
const NANO: i128 = 1_000_000_000;

/// Decimal SI exponents rendered by `Display`, largest first
const DECIMAL_SUFFIXES: [(u32, &str); 9] = [
    (27, "E"),
    (24, "P"),
    (21, "T"),
    (18, "G"),
    (15, "M"),
    (12, "k"),
    (9, ""),
    (6, "m"),
    (3, "u"),
];

/// Binary SI suffixes rendered by `Display`, largest first
const BINARY_SUFFIXES: [(u32, &str); 6] = [
    (6, "Ei"),
    (5, "Pi"),
    (4, "Ti"),
    (3, "Gi"),
    (2, "Mi"),
    (1, "Ki"),
];

/// Suffix family a quantity was written with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuantityFormat {
    /// n, u, m, k, M, G, T, P, E or no suffix
    #[default]
    DecimalSI,
    /// Ki, Mi, Gi, Ti, Pi, Ei
    BinarySI,
    /// e3, E-6, ...
    DecimalExponent,
}

/// A Kubernetes resource quantity
///
/// The value is held as a signed count of nano-units, so every suffix the
/// Kubernetes API accepts is represented exactly. Precision finer than one
/// nano-unit is rounded up, away from zero. Equality and ordering compare
/// values only; the format is kept so binary quantities render as binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: QuantityFormat,
}

/// Outcome of [`Quantity::checked_sub`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subtraction {
    /// Raw difference. Only meaningful as spare capacity when `sufficient`.
    pub remaining: Quantity,
    /// False when the subtrahend exceeded the minuend
    pub sufficient: bool,
}

impl Quantity {
    /// The additive identity
    pub const fn zero() -> Self {
        Self {
            nanos: 0,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Build a quantity from whole units
    pub fn from_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANO,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Build a quantity from thousandths (e.g. millicores)
    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis as i128 * 1_000_000,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Parse a quantity string (e.g. "500m", "2", "1.5Gi", "1e3")
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::invalid_quantity(s, reason);

        let (negative, rest) = match s.as_bytes().first() {
            None => return Err(invalid("empty quantity")),
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            Some(_) => (false, s),
        };

        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_end);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing digits"));
        }
        if fraction.contains('.') {
            return Err(invalid("more than one decimal point"));
        }

        let (binary_power, decimal_exponent, format) =
            parse_suffix(suffix).ok_or_else(|| invalid("unknown suffix"))?;

        let digits = format!("{}{}", whole, fraction);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| invalid("too many significant digits"))?;

        let binary_factor = 1024i128
            .checked_pow(binary_power)
            .ok_or_else(|| invalid("value out of range"))?;
        let magnitude = mantissa
            .checked_mul(binary_factor)
            .ok_or_else(|| invalid("value out of range"))?;

        // value = magnitude * 10^(decimal_exponent - fraction digits); stored in nanos
        let shift = 9i64 + decimal_exponent as i64 - fraction.len() as i64;
        let nanos = scale_by_pow10(magnitude, shift).ok_or_else(|| invalid("value out of range"))?;

        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
            format,
        })
    }

    /// Subtract `rhs`, reporting whether `self` was large enough
    pub fn checked_sub(&self, rhs: &Quantity) -> Subtraction {
        Subtraction {
            remaining: *self - *rhs,
            sufficient: rhs <= self,
        }
    }

    /// Whether this quantity is exactly zero
    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Whether this quantity is below zero
    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// Value in thousandths, rounded up
    pub fn millis(&self) -> i128 {
        div_ceil_away(self.nanos, 1_000_000)
    }

    /// Suffix family this quantity renders with
    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    /// Read `key` from a k8s resource map.
    ///
    /// Absent entries read as zero. Malformed entries also read as zero and
    /// are logged, matching how resource lists are read everywhere else.
    pub fn from_resource_map(resources: Option<&BTreeMap<String, K8sQuantity>>, key: &str) -> Self {
        match resources.and_then(|r| r.get(key)) {
            Some(q) => Self::try_from(q).unwrap_or_else(|e| {
                warn!("Ignoring malformed {} quantity: {}", key, e);
                Self::zero()
            }),
            None => Self::zero(),
        }
    }
}

/// Parse a suffix into (power of 1024, power of 10, format)
fn parse_suffix(suffix: &str) -> Option<(u32, i32, QuantityFormat)> {
    use QuantityFormat::*;

    let parsed = match suffix {
        "" => (0, 0, DecimalSI),
        "n" => (0, -9, DecimalSI),
        "u" => (0, -6, DecimalSI),
        "m" => (0, -3, DecimalSI),
        "k" => (0, 3, DecimalSI),
        "M" => (0, 6, DecimalSI),
        "G" => (0, 9, DecimalSI),
        "T" => (0, 12, DecimalSI),
        "P" => (0, 15, DecimalSI),
        "E" => (0, 18, DecimalSI),
        "Ki" => (1, 0, BinarySI),
        "Mi" => (2, 0, BinarySI),
        "Gi" => (3, 0, BinarySI),
        "Ti" => (4, 0, BinarySI),
        "Pi" => (5, 0, BinarySI),
        "Ei" => (6, 0, BinarySI),
        _ => {
            let exponent = suffix.strip_prefix(['e', 'E'])?;
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (0, exponent.parse().ok()?, DecimalExponent)
        }
    };
    Some(parsed)
}

/// Multiply by 10^shift, rounding up (away from zero) when shift is negative
fn scale_by_pow10(magnitude: i128, shift: i64) -> Option<i128> {
    if magnitude == 0 {
        return Some(0);
    }
    if shift >= 0 {
        let factor = 10i128.checked_pow(u32::try_from(shift).ok()?)?;
        magnitude.checked_mul(factor)
    } else {
        match 10i128.checked_pow(u32::try_from(-shift).ok()?) {
            Some(divisor) => Some(div_ceil_away(magnitude, divisor)),
            // Divisor exceeds any i128 magnitude: the smallest representable step remains
            None => Some(magnitude.signum()),
        }
    }
}

fn div_ceil_away(value: i128, divisor: i128) -> i128 {
    let quotient = value / divisor;
    if value % divisor == 0 {
        quotient
    } else {
        quotient + value.signum()
    }
}

impl FromStr for Quantity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&K8sQuantity> for Quantity {
    type Error = CoreError;

    fn try_from(q: &K8sQuantity) -> Result<Self> {
        Self::parse(&q.0)
    }
}

impl From<Quantity> for K8sQuantity {
    fn from(q: Quantity) -> Self {
        K8sQuantity(q.to_string())
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

// Arithmetic saturates at the i128 bounds and keeps the left operand's format.
impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_add(rhs.nanos),
            format: self.format,
        }
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_sub(rhs.nanos),
            format: self.format,
        }
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }

        if self.format == QuantityFormat::BinarySI && self.nanos % NANO == 0 {
            let units = self.nanos / NANO;
            for (power, suffix) in BINARY_SUFFIXES {
                let factor = 1024i128.pow(power);
                if units % factor == 0 {
                    return write!(f, "{}{}", units / factor, suffix);
                }
            }
        }

        for (exponent, suffix) in DECIMAL_SUFFIXES {
            let factor = 10i128.pow(exponent);
            if self.nanos % factor == 0 {
                return write!(f, "{}{}", self.nanos / factor, suffix);
            }
        }

        write!(f, "{}n", self.nanos)
    }
}
