//! Authoring of unsigned transactions and signing of their inputs.
//!
//! [`TxAuthor`] pulls inputs from an [`InputSource`] until they pay for the requested outputs and
//! the fee those inputs imply, then decides whether a change output from a [`ChangeSource`] is
//! worth adding. The resulting [`AuthoredTx`] keeps the previous output data of every input so
//! that [`AuthoredTx::add_all_input_scripts`] can later sign it with keys from a
//! [`SecretsSource`].
#![no_std]
pub use bitcoin;

mod author;
pub use author::*;
mod feerate;
pub use feerate::*;
pub mod policy;
pub mod shuffle;
pub mod sign;
pub use sign::{add_all_input_scripts, SecretsSource, SignError};
pub mod size;

#[allow(unused_imports)]
#[macro_use]
extern crate alloc;

#[cfg(feature = "serde")]
pub extern crate serde_crate as serde;

#[cfg(feature = "std")]
#[macro_use]
extern crate std;

/// The maximum amount of satoshi that can ever exist (21 million bitcoin).
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;
