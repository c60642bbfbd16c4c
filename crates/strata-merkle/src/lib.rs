//! # Strata Merkle
//!
//! Merkle proof engine for sector-addressed files.
//!
//! A file is a sequence of sectors; each sector is a sequence of segments. Both levels use
//! the same stack-based tree: a sector's root is built over its segments, and a file's root
//! is built over its sector roots without rehashing them.
//!
//! - [`build_diff_proof`] / [`verify_diff_proof`] prove a root transition without sending
//!   unchanged leaves. Uploads use them with cached sector roots.
//! - [`build_limit_proof`] / [`verify_limit_proof`] are the unbounded-drain variant.
//! - [`build_range_proof`] / [`verify_range_proof`] prove that downloaded segments belong
//!   under a sector root.

pub mod error;
pub mod proof;
pub mod range;
pub mod range_proof;
pub mod source;
pub mod tree;

pub use error::{MerkleError, Result};
pub use proof::{build_diff_proof, build_limit_proof, verify_diff_proof, verify_limit_proof, UNBOUNDED};
pub use range::{adjacent_subtree_size, check_ranges, ProofRange};
pub use range_proof::{build_range_proof, verify_range_proof};
pub use source::{
    CachedLeafSource, CachedSubtreeSource, LeafSource, ReaderLeafSource, ReaderSubtreeSource,
    SubtreeSource,
};
pub use tree::{cached_tree_root, leaf_hash, node_hash, sector_root, MerkleTree};
