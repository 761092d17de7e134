//! Fixed-point fractions of the root position.
//!
//! Every exposure in the pipeline is an integer number of fraction units so
//! that aggregation is reproducible bit-for-bit across machines. One unit is
//! 10^-8 of a basis point; [`Fraction::ONE`] is 100% (10 000 bps).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Units representing 100% of the root position.
pub const FRACTION_SCALE: u64 = 1_000_000_000_000;
/// Basis points in 100%.
pub const BPS_PER_ONE: u64 = 10_000;
const UNITS_PER_BPS: u64 = FRACTION_SCALE / BPS_PER_ONE;
/// Units per 1e-6 percent; the rounding tolerance on exposure sums.
const UNITS_PER_MICRO_PERCENT: u64 = FRACTION_SCALE / 100_000_000;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fraction(u64);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0);
    pub const ONE: Fraction = Fraction(FRACTION_SCALE);
    /// Tolerance for sums of independently floored products (1e-6 percent).
    pub const EPSILON: Fraction = Fraction(UNITS_PER_MICRO_PERCENT);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn from_bps(bps: u64) -> Self {
        Self(bps.saturating_mul(UNITS_PER_BPS))
    }

    /// `numerator / denominator`, floored. `None` for a zero denominator or a
    /// value that does not fit the fixed-point range.
    pub fn from_ratio(numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let raw = u128::from(numerator) * u128::from(FRACTION_SCALE) / u128::from(denominator);
        u64::try_from(raw).ok().map(Self)
    }

    /// Whole basis points, floored.
    pub fn to_bps(self) -> u64 {
        self.0 / UNITS_PER_BPS
    }

    /// Percentage of the root for presentation. Never feed this back into
    /// arithmetic.
    pub fn percentage(self) -> f64 {
        self.0 as f64 * 100.0 / FRACTION_SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// True for a valid holding share, i.e. in `(0, 1]`.
    pub fn is_unit_share(self) -> bool {
        self.0 > 0 && self.0 <= FRACTION_SCALE
    }

    /// Floored product of two fractions.
    pub fn mul(self, other: Fraction) -> Fraction {
        let product = u128::from(self.0) * u128::from(other.0) / u128::from(FRACTION_SCALE);
        // Both factors are at most u64::MAX and the scale divides out, so the
        // product only exceeds u64 when a factor is far above ONE.
        Fraction(u64::try_from(product).unwrap_or(u64::MAX))
    }

    pub fn checked_add(self, other: Fraction) -> Option<Fraction> {
        self.0.checked_add(other.0).map(Fraction)
    }

    pub fn saturating_add(self, other: Fraction) -> Fraction {
        Fraction(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Fraction) -> Fraction {
        Fraction(self.0.saturating_sub(other.0))
    }

    /// Floor of `amount × self`, exact for any `amount`.
    pub fn scale_amount(self, amount: u128) -> u128 {
        let scale = u128::from(FRACTION_SCALE);
        let raw = u128::from(self.0);
        let whole = (amount / scale).saturating_mul(raw);
        let rest = (amount % scale) * raw / scale;
        whole.saturating_add(rest)
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units_per_percent = FRACTION_SCALE / 100;
        let whole = self.0 / units_per_percent;
        let micro = (self.0 % units_per_percent) / UNITS_PER_MICRO_PERCENT;
        write!(f, "{}.{:06}%", whole, micro)
    }
}
