pub mod amount;
pub mod constants;
pub mod hash;
pub mod keys;

pub use amount::{Address, Amount, BASE_UNITS_PER_COIN};
pub use constants::*;
pub use hash::Hash;
pub use keys::{PublicKey, Signature};
