use crate::{
    policy::is_dust_amount,
    shuffle::randomize_output_position,
    size::{
        estimate_serialize_size_for, estimate_serialize_size_for_inputs, InputKind, KeyForm,
        P2PKH_PK_SCRIPT_SIZE,
    },
    FeeRate,
};
use alloc::vec::Vec;
use bitcoin::{PackedLockTime, Script, Transaction, TxIn, TxOut};
use rand::RngCore;

/// The inputs an [`InputSource`] offers for a target amount.
///
/// `inputs`, `prev_values` and `prev_scripts` are parallel: position `i` of each describes the same
/// input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputDetail {
    /// Total value of all `inputs`.
    pub amount: u64,
    pub inputs: Vec<TxIn>,
    /// The value of the output each input spends.
    pub prev_values: Vec<u64>,
    /// The `script_pubkey` of the output each input spends.
    pub prev_scripts: Vec<Script>,
}

impl InputDetail {
    /// Whether the parallel vectors line up with `inputs`.
    pub fn is_consistent(&self) -> bool {
        self.inputs.len() == self.prev_values.len() && self.inputs.len() == self.prev_scripts.len()
    }
}

/// Provides inputs referencing spendable outputs to fund a transaction.
///
/// [`TxAuthor`] calls this repeatedly with non-decreasing targets until the returned inputs pay
/// for the outputs and the fee. An implementation that cannot meet the target can either return
/// less than it was asked for or fail with its own error (e.g. [`InsufficientFunds`] or something
/// more specific like a locked-coin policy).
///
/// Implementations are responsible for not handing out outputs that are already being spent by a
/// concurrent authoring call.
pub trait InputSource {
    type Error;

    fn fetch_inputs(&mut self, target: u64) -> Result<InputDetail, Self::Error>;
}

impl<F, E> InputSource for F
where
    F: FnMut(u64) -> Result<InputDetail, E>,
{
    type Error = E;

    fn fetch_inputs(&mut self, target: u64) -> Result<InputDetail, Self::Error> {
        self(target)
    }
}

/// Provides the `script_pubkey` of a change output.
///
/// It is called at most once per authored transaction. The script must be no larger than a P2PKH
/// script, otherwise the fee estimate would be wrong and authoring fails with
/// [`CreateTxError::ChangeScriptTooLarge`].
pub trait ChangeSource {
    type Error;

    fn change_script(&mut self) -> Result<Script, Self::Error>;
}

impl<F, E> ChangeSource for F
where
    F: FnMut() -> Result<Script, E>,
{
    type Error = E;

    fn change_script(&mut self) -> Result<Script, Self::Error> {
        self()
    }
}

/// Errors an [`InputSource`] can report which mean "not enough funds" rather than a failure of
/// the source itself.
pub trait InputSourceError {
    fn is_insufficient_funds(&self) -> bool;
}

impl InputSourceError for core::convert::Infallible {
    fn is_insufficient_funds(&self) -> bool {
        match *self {}
    }
}

/// Not enough input value was available to pay for the outputs and the fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsufficientFunds {
    /// Amount of input value that was needed.
    pub target: u64,
    /// Amount of input value that was available.
    pub available: u64,
}

impl core::fmt::Display for InsufficientFunds {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "insufficient funds available to construct transaction (needed {} sats, have {} sats)",
            self.target, self.available
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InsufficientFunds {}

impl InputSourceError for InsufficientFunds {
    fn is_insufficient_funds(&self) -> bool {
        true
    }
}

/// Error returned by [`TxAuthor::create_unsigned`].
///
/// `I` and `C` are the errors of the [`InputSource`] and [`ChangeSource`]. They are returned as
/// they came out of the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateTxError<I, C> {
    /// No outputs were requested.
    NoOutputs,
    /// The requested output values do not fit in a `u64`.
    OutputValueOverflow,
    /// The input source returned less value than the outputs plus the estimated fee.
    InsufficientFunds(InsufficientFunds),
    /// The input source returned vectors of different lengths.
    InputDetailMismatch {
        inputs: usize,
        prev_values: usize,
        prev_scripts: usize,
    },
    /// The change source returned a script larger than the fee estimate allows for.
    ChangeScriptTooLarge { len: usize, max: usize },
    /// The fee did not settle within [`TxAuthor::max_rounds`] requests to the input source.
    FeeNotConverged { rounds: usize },
    /// The input source failed.
    InputSource(I),
    /// The change source failed.
    ChangeSource(C),
}

impl<I: InputSourceError, C> CreateTxError<I, C> {
    /// Whether this is a lack of funds, either detected while authoring or reported by the input
    /// source.
    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            CreateTxError::InsufficientFunds(_) => true,
            CreateTxError::InputSource(inner) => inner.is_insufficient_funds(),
            _ => false,
        }
    }
}

impl<I: core::fmt::Display, C: core::fmt::Display> core::fmt::Display for CreateTxError<I, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CreateTxError::NoOutputs => write!(f, "a transaction needs at least one output"),
            CreateTxError::OutputValueOverflow => {
                write!(f, "the sum of the output values overflows")
            }
            CreateTxError::InsufficientFunds(inner) => core::fmt::Display::fmt(inner, f),
            CreateTxError::InputDetailMismatch {
                inputs,
                prev_values,
                prev_scripts,
            } => write!(
                f,
                "input source returned {} inputs but {} previous values and {} previous scripts",
                inputs, prev_values, prev_scripts
            ),
            CreateTxError::ChangeScriptTooLarge { len, max } => write!(
                f,
                "fee estimation requires change scripts no larger than P2PKH output scripts ({} > {})",
                len, max
            ),
            CreateTxError::FeeNotConverged { rounds } => {
                write!(f, "fee did not converge after {} rounds", rounds)
            }
            CreateTxError::InputSource(inner) => core::fmt::Display::fmt(inner, f),
            CreateTxError::ChangeSource(inner) => core::fmt::Display::fmt(inner, f),
        }
    }
}

#[cfg(feature = "std")]
impl<I, C> std::error::Error for CreateTxError<I, C>
where
    I: core::fmt::Debug + core::fmt::Display,
    C: core::fmt::Debug + core::fmt::Display,
{
}

/// A newly authored transaction along with what is needed to sign it.
///
/// `prev_scripts` and `prev_input_values` are parallel to `tx.input`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(crate = "serde_crate")
)]
pub struct AuthoredTx {
    pub tx: Transaction,
    pub prev_scripts: Vec<Script>,
    pub prev_input_values: Vec<u64>,
    pub total_input: u64,
    /// Index of the change output in `tx.output`, if one was added.
    pub change_index: Option<usize>,
}

impl AuthoredTx {
    /// Sum of all output values, change included.
    pub fn output_value(&self) -> u64 {
        self.tx.output.iter().map(|txout| txout.value).sum()
    }

    /// The fee paid: everything the inputs bring in that the outputs don't pay out.
    pub fn fee(&self) -> u64 {
        self.total_input.saturating_sub(self.output_value())
    }

    pub fn change_output(&self) -> Option<&TxOut> {
        self.change_index
            .and_then(|index| self.tx.output.get(index))
    }

    /// Moves the change output to a random position. This must be done before signing.
    pub fn randomize_change_position(&mut self, rng: &mut impl RngCore) {
        if let Some(index) = self.change_index {
            self.change_index = Some(randomize_output_position(&mut self.tx.output, index, rng));
        }
    }
}

/// Options for authoring transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(crate = "serde_crate")
)]
pub struct TxAuthor {
    /// Fee rate the transaction must pay at its worst-case signed size.
    pub fee_rate: FeeRate,
    pub version: i32,
    pub lock_time: u32,
    /// Key form assumed for P2PKH inputs when estimating their size.
    pub key_form: KeyForm,
    /// How many times the input source may be asked before giving up on the fee.
    pub max_rounds: usize,
}

impl Default for TxAuthor {
    fn default() -> Self {
        Self {
            fee_rate: FeeRate::DEFAULT_MIN_RELAY,
            version: 1,
            lock_time: 0,
            key_form: KeyForm::Compressed,
            // Each round strictly raises the fee and an honest source settles in two.
            max_rounds: 16,
        }
    }
}

/// Where [`TxAuthor::create_unsigned`] is in negotiating inputs against the fee.
#[derive(Debug)]
enum Negotiation {
    Estimate,
    RequestInputs {
        estimated_fee: u64,
    },
    CheckSufficiency {
        estimated_fee: u64,
        detail: InputDetail,
    },
    CheckFeeShortfall {
        estimated_fee: u64,
        detail: InputDetail,
    },
    Finalize {
        required_fee: u64,
        detail: InputDetail,
    },
}

impl TxAuthor {
    pub fn new(fee_rate: FeeRate) -> Self {
        Self {
            fee_rate,
            ..Default::default()
        }
    }

    fn estimate_fee(&self, input_count: usize, outputs: &[TxOut]) -> u64 {
        let size = estimate_serialize_size_for(self.key_form, input_count, outputs, true);
        self.fee_rate.fee_for_size(size)
    }

    /// The fee needed to spend outputs with `prev_scripts`, sized by their script kind.
    fn required_fee(&self, prev_scripts: &[Script], outputs: &[TxOut]) -> u64 {
        let kinds = prev_scripts
            .iter()
            .map(|script| InputKind::from_prev_script(script, self.key_form))
            .collect::<Vec<_>>();
        let size = estimate_serialize_size_for_inputs(&kinds, outputs, true);
        self.fee_rate.fee_for_size(size)
    }

    /// Creates an unsigned transaction paying to `outputs` with inputs from `input_source`.
    ///
    /// The input source is asked for the output total plus a fee estimate. When the inputs it
    /// returns make the transaction bigger than estimated, it is asked again with the fee those
    /// inputs require, each sized by the kind of output it spends ([`InputKind`]). If the value
    /// left over can be returned without creating dust, a change output with a script from
    /// `change_source` is appended to the outputs.
    pub fn create_unsigned<I, C>(
        &self,
        outputs: Vec<TxOut>,
        input_source: &mut I,
        change_source: &mut C,
    ) -> Result<AuthoredTx, CreateTxError<I::Error, C::Error>>
    where
        I: InputSource + ?Sized,
        C: ChangeSource + ?Sized,
    {
        if outputs.is_empty() {
            return Err(CreateTxError::NoOutputs);
        }
        let target = outputs
            .iter()
            .try_fold(0u64, |sum, txout| sum.checked_add(txout.value))
            .ok_or(CreateTxError::OutputValueOverflow)?;

        let mut rounds = 0;
        let mut state = Negotiation::Estimate;

        loop {
            state = match state {
                Negotiation::Estimate => Negotiation::RequestInputs {
                    estimated_fee: self.estimate_fee(0, &outputs),
                },
                Negotiation::RequestInputs { estimated_fee } => {
                    if rounds == self.max_rounds {
                        return Err(CreateTxError::FeeNotConverged { rounds });
                    }
                    rounds += 1;
                    let request = target.saturating_add(estimated_fee);
                    log::debug!(
                        "round {}: requesting {} sats of inputs ({} + {} fee)",
                        rounds,
                        request,
                        target,
                        estimated_fee
                    );
                    let detail = input_source
                        .fetch_inputs(request)
                        .map_err(CreateTxError::InputSource)?;
                    Negotiation::CheckSufficiency {
                        estimated_fee,
                        detail,
                    }
                }
                Negotiation::CheckSufficiency {
                    estimated_fee,
                    detail,
                } => {
                    if !detail.is_consistent() {
                        return Err(CreateTxError::InputDetailMismatch {
                            inputs: detail.inputs.len(),
                            prev_values: detail.prev_values.len(),
                            prev_scripts: detail.prev_scripts.len(),
                        });
                    }
                    let request = target.saturating_add(estimated_fee);
                    if detail.amount < request {
                        return Err(CreateTxError::InsufficientFunds(InsufficientFunds {
                            target: request,
                            available: detail.amount,
                        }));
                    }
                    Negotiation::CheckFeeShortfall {
                        estimated_fee,
                        detail,
                    }
                }
                Negotiation::CheckFeeShortfall {
                    estimated_fee,
                    detail,
                } => {
                    let required_fee = self.required_fee(&detail.prev_scripts, &outputs);
                    let remaining = detail.amount - target;
                    if remaining < required_fee {
                        log::debug!(
                            "{} inputs need a fee of {} sats but only {} was budgeted",
                            detail.inputs.len(),
                            required_fee,
                            estimated_fee
                        );
                        Negotiation::RequestInputs {
                            estimated_fee: required_fee,
                        }
                    } else {
                        Negotiation::Finalize {
                            required_fee,
                            detail,
                        }
                    }
                }
                Negotiation::Finalize {
                    required_fee,
                    detail,
                } => {
                    return self.finalize(outputs, target, required_fee, detail, change_source);
                }
            };
        }
    }

    fn finalize<IE, C>(
        &self,
        mut outputs: Vec<TxOut>,
        target: u64,
        required_fee: u64,
        detail: InputDetail,
        change_source: &mut C,
    ) -> Result<AuthoredTx, CreateTxError<IE, C::Error>>
    where
        C: ChangeSource + ?Sized,
    {
        let change_amount = detail.amount - target - required_fee;
        let mut change_index = None;

        if change_amount != 0 && !is_dust_amount(change_amount, P2PKH_PK_SCRIPT_SIZE, self.fee_rate)
        {
            let script_pubkey = change_source
                .change_script()
                .map_err(CreateTxError::ChangeSource)?;
            if script_pubkey.len() > P2PKH_PK_SCRIPT_SIZE {
                return Err(CreateTxError::ChangeScriptTooLarge {
                    len: script_pubkey.len(),
                    max: P2PKH_PK_SCRIPT_SIZE,
                });
            }
            log::debug!("adding change output of {} sats", change_amount);
            change_index = Some(outputs.len());
            outputs.push(TxOut {
                value: change_amount,
                script_pubkey,
            });
        } else if change_amount != 0 {
            log::debug!(
                "change of {} sats is dust at {}, leaving it to the fee",
                change_amount,
                self.fee_rate
            );
        }

        let InputDetail {
            amount,
            inputs,
            prev_values,
            prev_scripts,
        } = detail;

        Ok(AuthoredTx {
            tx: Transaction {
                version: self.version,
                lock_time: PackedLockTime(self.lock_time),
                input: inputs,
                output: outputs,
            },
            prev_scripts,
            prev_input_values: prev_values,
            total_input: amount,
            change_index,
        })
    }
}

/// Creates an unsigned transaction with the default [`TxAuthor`] options at `fee_rate`.
///
/// See [`TxAuthor::create_unsigned`].
pub fn new_unsigned_transaction<I, C>(
    outputs: Vec<TxOut>,
    fee_rate: FeeRate,
    input_source: &mut I,
    change_source: &mut C,
) -> Result<AuthoredTx, CreateTxError<I::Error, C::Error>>
where
    I: InputSource + ?Sized,
    C: ChangeSource + ?Sized,
{
    TxAuthor::new(fee_rate).create_unsigned(outputs, input_source, change_source)
}
