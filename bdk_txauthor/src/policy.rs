//! Output policy: what counts as dust and when change is worth creating.
use crate::{size::varint_size, FeeRate, MAX_MONEY};
use bitcoin::TxOut;

/// Average size of an input redeeming a compressed P2PKH output. Dust is judged against the
/// typical cost of spending an output rather than the worst case used for fee estimation.
pub const AVERAGE_REDEEM_P2PKH_INPUT_SIZE: usize = 148;

/// An output is dust when the fee needed to create and later spend it is more than
/// `1 / DUST_RELAY_FRACTION` of its value.
pub const DUST_RELAY_FRACTION: u64 = 3;

/// Whether `amount` paid to a script of `script_size` bytes is dust at `fee_rate`.
///
/// The cost counted is the serialized output plus an average input redeeming it. The amount is
/// dust if that cost at `fee_rate` exceeds a third of the amount.
pub fn is_dust_amount(amount: u64, script_size: usize, fee_rate: FeeRate) -> bool {
    let total_size =
        (8 + varint_size(script_size) + script_size + AVERAGE_REDEEM_P2PKH_INPUT_SIZE) as u128;

    (amount as u128 * 1_000) / (DUST_RELAY_FRACTION as u128 * total_size)
        < fee_rate.as_sat_per_kb() as u128
}

/// Whether `txout` is dust at `fee_rate`.
pub fn is_dust_output(txout: &TxOut, fee_rate: FeeRate) -> bool {
    is_dust_amount(txout.value, txout.script_pubkey.len(), fee_rate)
}

/// Why an output failed [`check_output`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputError {
    /// The output pays more than can ever exist.
    ExceedsMaxMoney { value: u64 },
    /// The output value is dust at the given fee rate.
    Dust { value: u64, fee_rate: FeeRate },
}

impl core::fmt::Display for OutputError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OutputError::ExceedsMaxMoney { value } => write!(
                f,
                "output value {} exceeds the maximum of {} sats",
                value, MAX_MONEY
            ),
            OutputError::Dust { value, fee_rate } => {
                write!(f, "output value {} is dust at {}", value, fee_rate)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutputError {}

/// Checks that `txout` is a sensible payment at `fee_rate`: neither above [`MAX_MONEY`] nor dust.
pub fn check_output(txout: &TxOut, fee_rate: FeeRate) -> Result<(), OutputError> {
    if txout.value > MAX_MONEY {
        return Err(OutputError::ExceedsMaxMoney { value: txout.value });
    }
    if is_dust_output(txout, fee_rate) {
        return Err(OutputError::Dust {
            value: txout.value,
            fee_rate,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::size::P2PKH_PK_SCRIPT_SIZE;
    use bitcoin::Script;

    #[test]
    fn p2pkh_dust_threshold_at_min_relay() {
        // total size = 8 + 1 + 25 + 148 = 182, dust below 3 * 182 = 546 sats
        let rate = FeeRate::DEFAULT_MIN_RELAY;
        assert!(is_dust_amount(545, P2PKH_PK_SCRIPT_SIZE, rate));
        assert!(!is_dust_amount(546, P2PKH_PK_SCRIPT_SIZE, rate));
    }

    #[test]
    fn threshold_scales_with_fee_rate() {
        let rate = FeeRate::from_sat_per_kb(10_000);
        assert!(is_dust_amount(5_459, P2PKH_PK_SCRIPT_SIZE, rate));
        assert!(!is_dust_amount(5_460, P2PKH_PK_SCRIPT_SIZE, rate));
    }

    #[test]
    fn nothing_is_dust_at_zero_fee_rate() {
        assert!(!is_dust_amount(0, P2PKH_PK_SCRIPT_SIZE, FeeRate::ZERO));
    }

    #[test]
    fn check_output_rejects() {
        let script_pubkey = Script::from(vec![0u8; P2PKH_PK_SCRIPT_SIZE]);
        let rate = FeeRate::DEFAULT_MIN_RELAY;

        let dust = TxOut {
            value: 100,
            script_pubkey: script_pubkey.clone(),
        };
        assert_eq!(
            check_output(&dust, rate),
            Err(OutputError::Dust {
                value: 100,
                fee_rate: rate
            })
        );

        let too_much = TxOut {
            value: MAX_MONEY + 1,
            script_pubkey: script_pubkey.clone(),
        };
        assert_eq!(
            check_output(&too_much, rate),
            Err(OutputError::ExceedsMaxMoney {
                value: MAX_MONEY + 1
            })
        );

        let fine = TxOut {
            value: 10_000,
            script_pubkey,
        };
        assert_eq!(check_output(&fine, rate), Ok(()));
    }
}
