use crate::contract::{Payout, StorageContract, UnlockConditions};
use crate::revision::StorageContractRevision;
use strata_crypto::Keypair;
use strata_types::{Amount, Hash};

/// An empty, unsigned contract with a window at blocks 1000..1100
pub(crate) fn sample_contract(client: &Keypair, host: &Keypair) -> StorageContract {
    let unlock = UnlockConditions::two_of_two(*client.public_key(), *host.public_key());
    StorageContract {
        file_size: 0,
        file_merkle_root: Hash::ZERO,
        window_start: 1000,
        window_end: 1100,
        client_collateral: Payout::new(client.address(), Amount::from_base_units(500_000)),
        host_collateral: Payout::new(host.address(), Amount::from_base_units(200_000)),
        valid_proof_outputs: vec![
            Payout::new(client.address(), Amount::from_base_units(500_000)),
            Payout::new(host.address(), Amount::from_base_units(250_000)),
        ],
        missed_proof_outputs: vec![
            Payout::new(client.address(), Amount::from_base_units(500_000)),
            Payout::new(host.address(), Amount::from_base_units(250_000)),
        ],
        unlock_hash: unlock.unlock_hash().unwrap(),
        revision_number: 0,
        signatures: Vec::new(),
    }
}

/// Revision #1 of [`sample_contract`]
pub(crate) fn sample_revision(client: &Keypair, host: &Keypair) -> StorageContractRevision {
    let contract = sample_contract(client, host);
    let unlock = UnlockConditions::two_of_two(*client.public_key(), *host.public_key());
    StorageContractRevision::initial(&contract, unlock).unwrap()
}
