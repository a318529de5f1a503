//! Worst-case serialized size estimation.
//!
//! Estimates assume the largest possible DER signature for every input. Inputs are sized by the
//! kind of output they redeem ([`InputKind`]); when only a count is known they are taken to be
//! P2PKH. Over-estimating only costs a few satoshi in fees while under-estimating can leave a
//! transaction below the relay fee.
use bitcoin::{Script, TxOut, VarInt};

/// Size of a P2PKH output script:
/// `OP_DUP OP_HASH160 OP_DATA_20 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`.
pub const P2PKH_PK_SCRIPT_SIZE: usize = 1 + 1 + 1 + 20 + 1 + 1;

/// Maximum size of a signature script redeeming a P2PKH output with a compressed pubkey:
/// `OP_DATA_73 <73 byte sig + sighash type> OP_DATA_33 <33 byte pubkey>`.
pub const REDEEM_P2PKH_SIG_SCRIPT_SIZE: usize = 1 + 73 + 1 + 33;

/// Maximum size of a signature script redeeming a P2PKH output with an uncompressed pubkey.
pub const REDEEM_P2PKH_UNCOMPRESSED_SIG_SCRIPT_SIZE: usize = 1 + 73 + 1 + 65;

/// Maximum size of an input redeeming a compressed P2PKH output: outpoint (32 + 4), script
/// length varint, signature script and sequence.
pub const REDEEM_P2PKH_INPUT_SIZE: usize = 32 + 4 + 1 + REDEEM_P2PKH_SIG_SCRIPT_SIZE + 4;

/// Maximum size of an input redeeming an uncompressed P2PKH output.
pub const REDEEM_P2PKH_UNCOMPRESSED_INPUT_SIZE: usize =
    32 + 4 + 1 + REDEEM_P2PKH_UNCOMPRESSED_SIG_SCRIPT_SIZE + 4;

/// Maximum size of the witness of a P2WPKH spend: item count, then the signature and the
/// compressed pubkey each with a length prefix.
pub const REDEEM_P2WPKH_WITNESS_SIZE: usize = 1 + 1 + 73 + 1 + 33;

/// Maximum serialized size of an input redeeming a P2WPKH output: outpoint, empty signature
/// script, sequence and witness.
pub const REDEEM_P2WPKH_INPUT_SIZE: usize = 32 + 4 + 1 + 4 + REDEEM_P2WPKH_WITNESS_SIZE;

/// Signature script of a P2SH-P2WPKH spend: `OP_DATA_22 <p2wpkh program>`.
pub const REDEEM_P2SH_P2WPKH_SIG_SCRIPT_SIZE: usize = 1 + 22;

/// Maximum serialized size of an input redeeming a P2SH-wrapped P2WPKH output.
pub const REDEEM_P2SH_P2WPKH_INPUT_SIZE: usize =
    32 + 4 + 1 + REDEEM_P2SH_P2WPKH_SIG_SCRIPT_SIZE + 4 + REDEEM_P2WPKH_WITNESS_SIZE;

/// Segwit marker and flag bytes added once to a transaction with any witness.
pub const SEGWIT_MARKER_FLAG_SIZE: usize = 2;

/// Serialized size of a P2PKH output: value, script length varint and script.
pub const P2PKH_OUTPUT_SIZE: usize = 8 + 1 + P2PKH_PK_SCRIPT_SIZE;

/// Which public key serialization the inputs are assumed to reveal when redeemed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(crate = "serde_crate")
)]
pub enum KeyForm {
    #[default]
    Compressed,
    Uncompressed,
}

impl KeyForm {
    /// The maximum serialized size of one input redeeming a P2PKH output with this key form.
    pub fn redeem_input_size(&self) -> usize {
        match self {
            KeyForm::Compressed => REDEEM_P2PKH_INPUT_SIZE,
            KeyForm::Uncompressed => REDEEM_P2PKH_UNCOMPRESSED_INPUT_SIZE,
        }
    }
}

/// The kind of output an input redeems, as far as its size is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(crate = "serde_crate")
)]
pub enum InputKind {
    P2pkh(KeyForm),
    P2wpkh,
    /// P2SH wrapping a P2WPKH program.
    P2shP2wpkh,
}

impl InputKind {
    /// Classifies the output `prev_script` by its script template.
    ///
    /// P2SH outputs are assumed to wrap P2WPKH and anything unrecognized is sized as P2PKH with
    /// `key_form`.
    pub fn from_prev_script(prev_script: &Script, key_form: KeyForm) -> Self {
        if prev_script.is_v0_p2wpkh() {
            InputKind::P2wpkh
        } else if prev_script.is_p2sh() {
            InputKind::P2shP2wpkh
        } else {
            InputKind::P2pkh(key_form)
        }
    }

    /// The maximum serialized size of one input of this kind, witness included.
    pub fn redeem_input_size(&self) -> usize {
        match self {
            InputKind::P2pkh(key_form) => key_form.redeem_input_size(),
            InputKind::P2wpkh => REDEEM_P2WPKH_INPUT_SIZE,
            InputKind::P2shP2wpkh => REDEEM_P2SH_P2WPKH_INPUT_SIZE,
        }
    }

    pub fn has_witness(&self) -> bool {
        !matches!(self, InputKind::P2pkh(_))
    }
}

pub(crate) fn varint_size(v: usize) -> usize {
    VarInt(v as u64).len()
}

/// Serialized size of `txout`: 8 byte value, script length varint and the script itself.
pub fn output_serialize_size(txout: &TxOut) -> usize {
    let spk_len = txout.script_pubkey.len();
    8 + varint_size(spk_len) + spk_len
}

/// Sum of [`output_serialize_size`] over `txouts`.
pub fn sum_output_serialize_sizes(txouts: &[TxOut]) -> usize {
    txouts.iter().map(output_serialize_size).sum()
}

/// Estimates the worst-case serialized size of a transaction spending `input_count` compressed
/// P2PKH inputs to `txouts`, plus a P2PKH change output when `add_change_output` is set.
pub fn estimate_serialize_size(
    input_count: usize,
    txouts: &[TxOut],
    add_change_output: bool,
) -> usize {
    estimate_serialize_size_for(KeyForm::Compressed, input_count, txouts, add_change_output)
}

/// Like [`estimate_serialize_size`] but with the inputs' key form given by `key_form`.
pub fn estimate_serialize_size_for(
    key_form: KeyForm,
    input_count: usize,
    txouts: &[TxOut],
    add_change_output: bool,
) -> usize {
    let (output_count, change_size) = match add_change_output {
        true => (txouts.len() + 1, P2PKH_OUTPUT_SIZE),
        false => (txouts.len(), 0),
    };

    // 8 bytes for version and lock_time
    8 + varint_size(input_count)
        + varint_size(output_count)
        + input_count * key_form.redeem_input_size()
        + sum_output_serialize_sizes(txouts)
        + change_size
}

/// Estimates the worst-case serialized size of a transaction spending inputs of the given
/// `kinds` to `txouts`, plus a P2PKH change output when `add_change_output` is set.
///
/// Once any input has a witness, every other input serializes an empty witness and the
/// transaction carries the segwit marker and flag.
pub fn estimate_serialize_size_for_inputs(
    kinds: &[InputKind],
    txouts: &[TxOut],
    add_change_output: bool,
) -> usize {
    let (output_count, change_size) = match add_change_output {
        true => (txouts.len() + 1, P2PKH_OUTPUT_SIZE),
        false => (txouts.len(), 0),
    };
    let witness_overhead = match kinds.iter().any(InputKind::has_witness) {
        true => {
            SEGWIT_MARKER_FLAG_SIZE + kinds.iter().filter(|kind| !kind.has_witness()).count()
        }
        false => 0,
    };

    8 + varint_size(kinds.len())
        + varint_size(output_count)
        + kinds.iter().map(InputKind::redeem_input_size).sum::<usize>()
        + witness_overhead
        + sum_output_serialize_sizes(txouts)
        + change_size
}
