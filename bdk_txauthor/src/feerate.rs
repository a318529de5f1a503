use crate::MAX_MONEY;

/// A fee rate in satoshi per 1000 bytes of serialized transaction size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(crate = "serde_crate")
)]
pub struct FeeRate(u64);

impl FeeRate {
    /// The default minimum relay fee of bitcoind (1 sat/vb).
    pub const DEFAULT_MIN_RELAY: FeeRate = FeeRate(1_000);

    /// A fee rate of zero. Transactions authored with it carry no fee.
    pub const ZERO: FeeRate = FeeRate(0);

    pub const fn from_sat_per_kb(sat_per_kb: u64) -> Self {
        Self(sat_per_kb)
    }

    pub const fn from_sat_per_vb(sat_per_vb: u64) -> Self {
        Self(sat_per_vb.saturating_mul(1_000))
    }

    pub const fn as_sat_per_kb(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Shorthand for [`fee_for_serialize_size`].
    pub fn fee_for_size(&self, serialize_size: usize) -> u64 {
        fee_for_serialize_size(*self, serialize_size)
    }
}

impl core::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} sat/kB", self.0)
    }
}

/// Calculates the fee to pay for a transaction of `serialize_size` bytes at `fee_rate`.
///
/// The multiplication truncates toward zero. A non-zero fee rate never results in a zero fee: if
/// the truncated result is zero, the fee is the fee rate itself. The result is clamped to
/// [`MAX_MONEY`].
pub fn fee_for_serialize_size(fee_rate: FeeRate, serialize_size: usize) -> u64 {
    let fee = fee_rate
        .0
        .checked_mul(serialize_size as u64)
        .map(|scaled| scaled / 1_000)
        .unwrap_or(MAX_MONEY);

    if fee == 0 && !fee_rate.is_zero() {
        return fee_rate.0.min(MAX_MONEY);
    }

    fee.min(MAX_MONEY)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fee_truncates_toward_zero() {
        let rate = FeeRate::from_sat_per_kb(1_000);
        assert_eq!(fee_for_serialize_size(rate, 226), 226);

        let rate = FeeRate::from_sat_per_kb(1_500);
        // 1500 * 225 / 1000 = 337.5
        assert_eq!(fee_for_serialize_size(rate, 225), 337);
    }

    #[test]
    fn positive_rate_never_pays_zero() {
        let rate = FeeRate::from_sat_per_kb(3);
        assert_eq!(fee_for_serialize_size(rate, 100), 3);
        assert_eq!(fee_for_serialize_size(FeeRate::ZERO, 100), 0);
    }

    #[test]
    fn fee_is_clamped_to_max_money() {
        let rate = FeeRate::from_sat_per_kb(u64::MAX);
        assert_eq!(fee_for_serialize_size(rate, 250), MAX_MONEY);
        assert_eq!(fee_for_serialize_size(rate, 0), MAX_MONEY);
    }

    #[test]
    fn sat_per_vb_conversion() {
        assert_eq!(FeeRate::from_sat_per_vb(1), FeeRate::DEFAULT_MIN_RELAY);
        assert_eq!(FeeRate::from_sat_per_vb(12).as_sat_per_kb(), 12_000);
    }
}
