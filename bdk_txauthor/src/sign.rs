//! Signing every input of an authored transaction with keys looked up by address.
use crate::AuthoredTx;
use alloc::vec::Vec;
use bitcoin::{
    blockdata::script::Builder,
    secp256k1::{Message, Secp256k1, Signing},
    util::sighash::{self, SighashCache},
    Address, AddressType, EcdsaSig, EcdsaSighashType, Network, PrivateKey, Script,
    Transaction, Witness,
};

/// Provides the private keys and redeem scripts needed to sign inputs.
///
/// Secrets are looked up by the [`Address`] of the previous output script. Addresses are created
/// for [`SecretsSource::network`], so one source manages the secrets of a single network.
pub trait SecretsSource {
    type Error;

    /// The key that controls `address`. Its `compressed` flag decides which public key
    /// serialization ends up in the unlocking data.
    fn get_key(&self, address: &Address) -> Result<PrivateKey, Self::Error>;

    /// The redeem script of a P2SH `address`.
    fn get_script(&self, address: &Address) -> Result<Script, Self::Error>;

    fn network(&self) -> Network;
}

#[derive(Debug)]
pub enum SignError<E> {
    /// The transaction has a different number of inputs than previous scripts or values given.
    InputCountMismatch {
        inputs: usize,
        prev_scripts: usize,
        prev_values: usize,
    },
    /// The previous output script of the input is not a standard address.
    NoAddress { index: usize },
    /// The previous output script is an address type we can't sign for.
    UnsupportedScript { index: usize },
    /// The key or redeem script from the [`SecretsSource`] does not hash to the previous output
    /// script.
    KeyMismatch { index: usize },
    /// Witness spends need a compressed key.
    UncompressedWitnessKey { index: usize },
    SigHash(sighash::Error),
    /// The [`SecretsSource`] failed.
    Secrets(E),
}

impl<E> From<sighash::Error> for SignError<E> {
    fn from(e: sighash::Error) -> Self {
        Self::SigHash(e)
    }
}

impl<E: core::fmt::Display> core::fmt::Display for SignError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SignError::InputCountMismatch {
                inputs,
                prev_scripts,
                prev_values,
            } => write!(
                f,
                "transaction has {} inputs but {} previous scripts and {} previous values were given",
                inputs, prev_scripts, prev_values
            ),
            SignError::NoAddress { index } => {
                write!(f, "previous output of input {} has no address", index)
            }
            SignError::UnsupportedScript { index } => {
                write!(f, "can't sign for the previous output of input {}", index)
            }
            SignError::KeyMismatch { index } => write!(
                f,
                "secrets for input {} do not match its previous output script",
                index
            ),
            SignError::UncompressedWitnessKey { index } => {
                write!(f, "witness input {} requires a compressed key", index)
            }
            SignError::SigHash(e) => core::fmt::Display::fmt(e, f),
            SignError::Secrets(e) => core::fmt::Display::fmt(e, f),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug + core::fmt::Display> std::error::Error for SignError<E> {}

/// Signs every input of `tx` with `SIGHASH_ALL`, replacing their `script_sig` and `witness`.
///
/// `prev_scripts` and `prev_values` describe the outputs spent by `tx.input` and must have the
/// same length. Keys and redeem scripts come from `secrets`. P2PKH, P2WPKH and P2SH-wrapped
/// P2WPKH outputs can be signed.
///
/// Nothing is written unless every input could be signed.
pub fn add_all_input_scripts<S: SecretsSource + ?Sized>(
    tx: &mut Transaction,
    prev_scripts: &[Script],
    prev_values: &[u64],
    secrets: &S,
) -> Result<(), SignError<S::Error>> {
    if tx.input.len() != prev_scripts.len() || tx.input.len() != prev_values.len() {
        return Err(SignError::InputCountMismatch {
            inputs: tx.input.len(),
            prev_scripts: prev_scripts.len(),
            prev_values: prev_values.len(),
        });
    }

    let secp = Secp256k1::signing_only();
    let unlocks = {
        let mut sighash_cache = SighashCache::new(&*tx);
        prev_scripts
            .iter()
            .zip(prev_values)
            .enumerate()
            .map(|(index, (prev_script, value))| {
                unlock_input(
                    &secp,
                    &mut sighash_cache,
                    index,
                    prev_script,
                    *value,
                    secrets,
                )
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    for (txin, (script_sig, witness)) in tx.input.iter_mut().zip(unlocks) {
        txin.script_sig = script_sig;
        txin.witness = witness;
    }

    Ok(())
}

impl AuthoredTx {
    /// Signs every input of the transaction. See [`add_all_input_scripts`].
    pub fn add_all_input_scripts<S: SecretsSource + ?Sized>(
        &mut self,
        secrets: &S,
    ) -> Result<(), SignError<S::Error>> {
        add_all_input_scripts(
            &mut self.tx,
            &self.prev_scripts,
            &self.prev_input_values,
            secrets,
        )
    }
}

fn unlock_input<C: Signing, S: SecretsSource + ?Sized>(
    secp: &Secp256k1<C>,
    sighash_cache: &mut SighashCache<&Transaction>,
    index: usize,
    prev_script: &Script,
    value: u64,
    secrets: &S,
) -> Result<(Script, Witness), SignError<S::Error>> {
    let network = secrets.network();
    let address = Address::from_script(prev_script, network)
        .map_err(|_| SignError::NoAddress { index })?;

    match address.address_type() {
        Some(AddressType::P2pkh) => {
            let key = secrets.get_key(&address).map_err(SignError::Secrets)?;
            let pubkey = key.public_key(secp);
            if Script::new_p2pkh(&pubkey.pubkey_hash()) != *prev_script {
                return Err(SignError::KeyMismatch { index });
            }
            let sighash = sighash_cache.legacy_signature_hash(
                index,
                prev_script,
                EcdsaSighashType::All.to_u32(),
            )?;
            let sig = ecdsa_sig(secp, &sighash[..], &key);
            log::trace!("signed p2pkh input {}", index);

            let script_sig = Builder::new()
                .push_slice(&sig)
                .push_key(&pubkey)
                .into_script();
            Ok((script_sig, Witness::default()))
        }
        Some(AddressType::P2wpkh) => {
            let key = secrets.get_key(&address).map_err(SignError::Secrets)?;
            let witness = p2wpkh_witness(secp, sighash_cache, index, prev_script, value, &key)?;
            log::trace!("signed p2wpkh input {}", index);
            Ok((Script::new(), witness))
        }
        Some(AddressType::P2sh) => {
            let redeem_script = secrets.get_script(&address).map_err(SignError::Secrets)?;
            if redeem_script.to_p2sh() != *prev_script {
                return Err(SignError::KeyMismatch { index });
            }
            if !redeem_script.is_v0_p2wpkh() {
                return Err(SignError::UnsupportedScript { index });
            }
            let inner = Address::from_script(&redeem_script, network)
                .map_err(|_| SignError::NoAddress { index })?;
            let key = secrets.get_key(&inner).map_err(SignError::Secrets)?;
            let witness = p2wpkh_witness(secp, sighash_cache, index, &redeem_script, value, &key)?;
            log::trace!("signed p2sh-p2wpkh input {}", index);

            let script_sig = Builder::new()
                .push_slice(redeem_script.as_bytes())
                .into_script();
            Ok((script_sig, witness))
        }
        _ => Err(SignError::UnsupportedScript { index }),
    }
}

fn p2wpkh_witness<C: Signing, E>(
    secp: &Secp256k1<C>,
    sighash_cache: &mut SighashCache<&Transaction>,
    index: usize,
    witness_program: &Script,
    value: u64,
    key: &PrivateKey,
) -> Result<Witness, SignError<E>> {
    let pubkey = key.public_key(secp);
    let wpubkey_hash = pubkey
        .wpubkey_hash()
        .ok_or(SignError::UncompressedWitnessKey { index })?;
    if Script::new_v0_p2wpkh(&wpubkey_hash) != *witness_program {
        return Err(SignError::KeyMismatch { index });
    }

    // BIP143: the script code of a p2wpkh spend is the p2pkh script of the key
    let script_code = Script::new_p2pkh(&pubkey.pubkey_hash());
    let sighash =
        sighash_cache.segwit_signature_hash(index, &script_code, value, EcdsaSighashType::All)?;
    let sig = ecdsa_sig(secp, &sighash[..], key);

    Ok(Witness::from_vec(vec![sig, pubkey.to_bytes()]))
}

fn ecdsa_sig<C: Signing>(secp: &Secp256k1<C>, sighash: &[u8], key: &PrivateKey) -> Vec<u8> {
    let msg = Message::from_slice(sighash).expect("sighash is 32 bytes");
    EcdsaSig {
        sig: secp.sign_ecdsa(&msg, &key.inner),
        hash_ty: EcdsaSighashType::All,
    }
    .to_vec()
}
