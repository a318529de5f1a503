#![allow(dead_code)]
use bdk_txauthor::{
    bitcoin::{
        secp256k1::{Secp256k1, SecretKey},
        Address, Network, OutPoint, PrivateKey, Script, TxIn, TxOut,
    },
    InputDetail, InputSource, SecretsSource,
};
use std::collections::HashMap;

#[allow(unused_macros)]
macro_rules! h {
    ($index:literal) => {{
        bdk_txauthor::bitcoin::hashes::Hash::hash($index.as_bytes())
    }};
}

pub const NETWORK: Network = Network::Regtest;

pub fn private_key(seed: u8) -> PrivateKey {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    PrivateKey::new(secret, NETWORK)
}

pub fn uncompressed_private_key(seed: u8) -> PrivateKey {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    PrivateKey::new_uncompressed(secret, NETWORK)
}

pub fn p2pkh_address(key: &PrivateKey) -> Address {
    Address::p2pkh(&key.public_key(&Secp256k1::new()), NETWORK)
}

pub fn p2wpkh_address(key: &PrivateKey) -> Address {
    Address::p2wpkh(&key.public_key(&Secp256k1::new()), NETWORK).expect("compressed key")
}

pub fn p2shwpkh_address(key: &PrivateKey) -> Address {
    Address::p2shwpkh(&key.public_key(&Secp256k1::new()), NETWORK).expect("compressed key")
}

/// The p2wpkh program a p2sh-p2wpkh address commits to.
pub fn p2wpkh_redeem_script(key: &PrivateKey) -> Script {
    p2wpkh_address(key).script_pubkey()
}

pub fn payment(value: u64, seed: u8) -> TxOut {
    TxOut {
        value,
        script_pubkey: p2pkh_address(&private_key(seed)).script_pubkey(),
    }
}

/// A spendable output: the input spending it, its value and its script.
#[derive(Clone, Debug)]
pub struct Utxo {
    pub txin: TxIn,
    pub value: u64,
    pub script_pubkey: Script,
}

impl Utxo {
    pub fn new(outpoint: OutPoint, value: u64, script_pubkey: Script) -> Self {
        Self {
            txin: TxIn {
                previous_output: outpoint,
                ..Default::default()
            },
            value,
            script_pubkey,
        }
    }
}

pub fn input_detail<'a>(utxos: impl IntoIterator<Item = &'a Utxo>) -> InputDetail {
    let mut detail = InputDetail::default();
    for utxo in utxos {
        detail.amount += utxo.value;
        detail.inputs.push(utxo.txin.clone());
        detail.prev_values.push(utxo.value);
        detail.prev_scripts.push(utxo.script_pubkey.clone());
    }
    detail
}

/// Hands out utxos in order until the target is met, recording every target it was asked for.
#[derive(Clone, Debug, Default)]
pub struct OrderedInputs {
    pub utxos: Vec<Utxo>,
    pub requests: Vec<u64>,
}

impl OrderedInputs {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos,
            requests: vec![],
        }
    }
}

impl InputSource for OrderedInputs {
    type Error = core::convert::Infallible;

    fn fetch_inputs(&mut self, target: u64) -> Result<InputDetail, Self::Error> {
        self.requests.push(target);
        let mut total = 0;
        let selected = self
            .utxos
            .iter()
            .take_while(|utxo| {
                let needed = total < target;
                total += utxo.value;
                needed
            })
            .collect::<Vec<_>>();
        Ok(input_detail(selected))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissingSecret(pub Address);

impl core::fmt::Display for MissingSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "no secret for {}", self.0)
    }
}

impl std::error::Error for MissingSecret {}

#[derive(Clone, Debug, Default)]
pub struct TestSecrets {
    pub keys: HashMap<Address, PrivateKey>,
    pub scripts: HashMap<Address, Script>,
}

impl TestSecrets {
    pub fn with_p2pkh(mut self, key: PrivateKey) -> Self {
        self.keys.insert(p2pkh_address(&key), key);
        self
    }

    pub fn with_p2wpkh(mut self, key: PrivateKey) -> Self {
        self.keys.insert(p2wpkh_address(&key), key);
        self
    }

    pub fn with_p2shwpkh(mut self, key: PrivateKey) -> Self {
        self.scripts
            .insert(p2shwpkh_address(&key), p2wpkh_redeem_script(&key));
        self.with_p2wpkh(key)
    }
}

impl SecretsSource for TestSecrets {
    type Error = MissingSecret;

    fn get_key(&self, address: &Address) -> Result<PrivateKey, Self::Error> {
        self.keys
            .get(address)
            .cloned()
            .ok_or_else(|| MissingSecret(address.clone()))
    }

    fn get_script(&self, address: &Address) -> Result<Script, Self::Error> {
        self.scripts
            .get(address)
            .cloned()
            .ok_or_else(|| MissingSecret(address.clone()))
    }

    fn network(&self) -> Network {
        NETWORK
    }
}
