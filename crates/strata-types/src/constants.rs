//! Sizes and protocol constants whose exact values both negotiating parties depend on.

use std::time::Duration;

/// Size of a sector, the unit of storage accounting and of append actions.
pub const SECTOR_SIZE: u64 = 1 << 22;

/// Size of a segment, the leaf unit of a sector's Merkle tree.
pub const SEGMENT_SIZE: u64 = 64;

/// Size in bytes of every hash in the system.
pub const HASH_SIZE: u64 = 32;

/// Number of segment leaves in one sector.
pub const SEGMENTS_PER_SECTOR: u64 = SECTOR_SIZE / SEGMENT_SIZE;

/// Smallest bandwidth a download request is charged for.
pub const RPC_MIN_LEN: u64 = 4096;

/// Blocks before the proof window opens after which a revision is considered late.
pub const REVISION_SUBMISSION_BUFFER: u64 = 144;

pub const BLOCKS_PER_HOUR: u64 = 240;
pub const BLOCKS_PER_DAY: u64 = 24 * BLOCKS_PER_HOUR;

/// Extra percentage a client adds to download estimates to absorb block height drift.
pub const DOWNLOAD_SAFETY_MARGIN_PERCENT: u64 = 2;

/// Bounded wait when acquiring a contract's negotiation lock.
pub const RESPONSIBILITY_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Valid and missed payout schedules each carry exactly this many outputs.
pub const EXPECTED_PAYOUT_COUNT: usize = 2;

pub const CONTRACT_REQUIRED_SIGNATURES: usize = 2;

pub const CLIENT_PAYOUT_INDEX: usize = 0;
pub const HOST_PAYOUT_INDEX: usize = 1;

pub const CLIENT_SIGNATURE_INDEX: usize = 0;
pub const HOST_SIGNATURE_INDEX: usize = 1;
